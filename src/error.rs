use std::fmt;

use crate::gmm;

/// Argument-validation errors surfaced by [`segment`](crate::segment).
///
/// None of these are recoverable internally: the call aborts and the mask is
/// left in whatever state the failing step had reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The input image has zero width or height.
    EmptyImage,
    /// The mask does not match the image dimensions.
    MaskSize {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    /// A mask pixel holds a value outside the four trimap labels.
    MaskValue { x: u32, y: u32, value: u8 },
    /// A model buffer has the wrong length (or is empty in `Eval` mode).
    ModelShape { actual: usize },
    /// One of the two color-sample sets was empty when seeding the mixtures.
    EmptySamples { foreground: bool },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyImage => write!(f, "image is empty"),
            Error::MaskSize { expected, actual } => write!(
                f,
                "mask must have as many rows and cols as the image (expected {}x{}, got {}x{})",
                expected.0, expected.1, actual.0, actual.1
            ),
            Error::MaskValue { x, y, value } => write!(
                f,
                "mask element at ({x}, {y}) must be BGD, FGD, PR_BGD or PR_FGD, got {value}"
            ),
            Error::ModelShape { actual } => write!(
                f,
                "model must have 1x{} shape ({} doubles per mixture component), got length {}",
                gmm::MODEL_LEN,
                gmm::MODEL_LEN / gmm::COMPONENTS,
                actual
            ),
            Error::EmptySamples { foreground } => write!(
                f,
                "no {} candidate pixels to seed the mixture model from",
                if *foreground { "foreground" } else { "background" }
            ),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
