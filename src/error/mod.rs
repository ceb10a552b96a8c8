#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Mismatched shape: {0:?} should be {1:?}")]
    MismatchedShape(Vec<usize>, Vec<usize>),

    #[error("Out of bound: index {0} should be less than {1}")]
    OutOfBound(usize, usize),

    #[error("Validation Error: {0} should be {1}")]
    Validation(String, String),
}
