/// An error type for the options module.
#[derive(thiserror::Error, Debug)]
pub enum OptionsError {
    /// A value is not one of the accepted choices.
    #[error("Invalid value '{value}' for {option}, expected one of: {choices}")]
    InvalidChoice {
        /// The option name.
        option: &'static str,
        /// The rejected value.
        value: String,
        /// The accepted values.
        choices: &'static str,
    },

    /// A value is outside its valid range.
    #[error("Invalid value for {option}: {reason}")]
    InvalidValue {
        /// The option name.
        option: &'static str,
        /// What is wrong with the value.
        reason: String,
    },

    /// The suffix references an option that does not exist.
    #[error("Unknown option '{0}' in suffix")]
    UnknownPlaceholder(String),

    /// The suffix has an unbalanced brace.
    #[error("Malformed suffix: {0}")]
    InvalidSuffix(String),

    /// A gpu id is not an integer.
    #[error("Invalid gpu id '{0}'")]
    InvalidGpuId(String),

    /// Error writing the options file.
    #[error("Failed to save the options. {0}")]
    Io(#[from] std::io::Error),

    /// Error collecting the option values.
    #[error("Failed to collect the option values. {0}")]
    Serialize(#[from] serde_json::Error),
}
