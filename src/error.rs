use thiserror::Error;

/// An integer outside of a closed enum set (canvas type, cell type, ...).
///
/// Well-formed documents never produce this; when it shows up while reading a bag
/// it is converted into [`crate::bag::BagUnpackError::IllegalArgument`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct IllegalArgument(pub String);

impl IllegalArgument {
    pub fn unknown_enum_value(kind: &str, value: i32) -> Self {
        Self(format!("Unknown enum value={} for {}", value, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_enum_message_names_kind_and_value() {
        let err = IllegalArgument::unknown_enum_value("CanvasType", 99);
        assert_eq!(err.to_string(), "Unknown enum value=99 for CanvasType");
    }
}
