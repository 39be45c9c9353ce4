//! Typed error taxonomy shared by every core component (spec §7).
//!
//! Every fallible core operation returns `Result<T>` with the `where`
//! (category/location tag) and `what` (message) pair called for by the
//! original's `rld::error` exception. `Display` renders exactly
//! `error: <where>: <what>`, which is the one line the CLI layer prints.

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{location}: invalid file name: {what}")]
    InvalidFileName { what: String, location: &'static str },

    #[error("{location}: file not found: {what}")]
    FileNotFound { what: String, location: &'static str },

    #[error("{location}: not an ELF object: {what}")]
    NotElf { what: String, location: &'static str },

    #[error("{location}: not an archive: {what}")]
    NotArchive { what: String, location: &'static str },

    #[error("{location}: mixed object classes: {what}")]
    MixedClasses { what: String, location: &'static str },

    #[error("{location}: mixed machine types: {what}")]
    MixedMachineTypes { what: String, location: &'static str },

    #[error("{location}: mixed data encodings: {what}")]
    MixedDataTypes { what: String, location: &'static str },

    #[error("{location}: malformed archive: {what}")]
    MalformedArchive { what: String, location: &'static str },

    #[error("{location}: unresolved symbol '{symbol}' referenced in '{owner}'")]
    UnresolvedSymbol {
        symbol: String,
        owner: String,
        location: &'static str,
    },

    #[error("{location}: duplicate symbol: {what}")]
    DuplicateSymbol { what: String, location: &'static str },

    #[error("{location}: corrupt compression block: {what}")]
    BadCompressionBlock { what: String, location: &'static str },

    #[error("{location}: mode violation: {what}")]
    ModeViolation { what: String, location: &'static str },

    #[error("{location}: I/O failure: {what}")]
    IoFailure {
        what: String,
        location: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{location}: no ELF header loaded: {what}")]
    NoHeader { what: String, location: &'static str },
}

impl Error {
    /// The `where` category/location tag (spec §7 "where").
    pub fn location(&self) -> &'static str {
        match self {
            Error::InvalidFileName { location, .. }
            | Error::FileNotFound { location, .. }
            | Error::NotElf { location, .. }
            | Error::NotArchive { location, .. }
            | Error::MixedClasses { location, .. }
            | Error::MixedMachineTypes { location, .. }
            | Error::MixedDataTypes { location, .. }
            | Error::MalformedArchive { location, .. }
            | Error::DuplicateSymbol { location, .. }
            | Error::BadCompressionBlock { location, .. }
            | Error::ModeViolation { location, .. }
            | Error::IoFailure { location, .. }
            | Error::NoHeader { location, .. } => location,
            Error::UnresolvedSymbol { location, .. } => location,
        }
    }

    pub fn io(location: &'static str, what: impl Into<String>, source: std::io::Error) -> Error {
        Error::IoFailure {
            what: what.into(),
            location,
            source,
        }
    }
}

/// Formats the single user-visible line the CLI layer prints (spec §7).
pub fn user_visible_line(err: &Error) -> String {
    format!("error: {err}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_error_where_what_grammar() {
        let err = Error::UnresolvedSymbol {
            symbol: "nowhere".into(),
            owner: "a.o".into(),
            location: "resolving",
        };
        assert_eq!(
            user_visible_line(&err),
            "error: resolving: unresolved symbol 'nowhere' referenced in 'a.o'"
        );
    }

    #[test]
    fn location_accessor_matches_variant() {
        let err = Error::NotElf {
            what: "bad magic".into(),
            location: "elf",
        };
        assert_eq!(err.location(), "elf");
    }
}
