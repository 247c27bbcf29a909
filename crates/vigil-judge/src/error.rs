/// Errors raised while compiling a strategy's rule text into an operator.
///
/// A strategy that fails to parse never becomes an active unit; every other
/// strategy in the same snapshot is unaffected.
///
/// # Examples
///
/// ```rust
/// use vigil_judge::error::ParseError;
///
/// let err = ParseError::UnknownTransform("pick".to_string());
/// assert!(err.to_string().contains("pick"));
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    /// The rule text does not have the `name(args)` shape.
    #[error("Parse: malformed expression '{0}'")]
    Malformed(String),

    /// The field transform keyword is not one of `select`, `rangeselect`,
    /// `rangeand`, `rangeor`.
    #[error("Parse: unknown field transform '{0}'")]
    UnknownTransform(String),

    /// The calculation keyword in `func` is not a known calculation.
    #[error("Parse: unknown calculation '{0}'")]
    UnknownCalculation(String),

    /// The comparison operator string is not recognised.
    #[error("Parse: unknown compare operator '{0}'")]
    UnknownOperator(String),

    /// Wrong number of arguments for a transform or calculation.
    #[error("Parse: {name} expects {expected} arguments, got {got}")]
    Arity {
        name: &'static str,
        expected: &'static str,
        got: usize,
    },

    /// A numeric argument could not be parsed.
    #[error("Parse: invalid number '{0}'")]
    InvalidNumber(String),

    /// A calculation that needs an extra integer argument did not get one.
    #[error("Parse: {0} requires an integer argument")]
    MissingArgument(&'static str),

    /// Window sizes must lie between one sample and the configured maximum.
    #[error("Parse: window size out of range, got {0}")]
    InvalidWindow(i64),

    /// A tag filter expression lacks a key or an `=`.
    #[error("Parse: malformed tag filter '{0}'")]
    TagFilter(String),
}

/// Errors returned by a calculation function.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalcError {
    #[error("Calc: empty window")]
    EmptyWindow,

    /// Difference calculations need at least two samples.
    #[error("Calc: {0} needs at least two samples")]
    NotEnoughSamples(&'static str),

    /// The calculation's extra integer argument is absent.
    #[error("Calc: {0} requires an integer argument")]
    MissingArgument(&'static str),

    /// A percentage difference had a zero denominator.
    #[error("Calc: zero divisor at window index {index}")]
    ZeroDivisor { index: usize },
}

/// Errors produced while judging one metric against one strategy.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JudgeError {
    /// The field named by the transform is absent on this metric. This is a
    /// normal, high-frequency condition.
    #[error("Judge: field '{0}' missing")]
    FieldMissing(String),

    /// A range transform rejected the metric.
    #[error("Judge: field '{0}' out of range")]
    OutOfRange(String),

    #[error("Judge: {0}")]
    Calculation(#[from] CalcError),
}

/// Convenience `Result` alias for judgment operations.
pub type Result<T> = std::result::Result<T, JudgeError>;
