//! Default values for session settings.

pub(super) fn default_true() -> bool {
    true
}

pub(super) fn default_author() -> String {
    "melddb".to_string()
}
