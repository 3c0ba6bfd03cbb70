pub mod normalize;
pub mod plausibility;
pub mod upload;

pub use normalize::{NormalizedTensor, normalize};
pub use plausibility::is_likely_xray;
pub use upload::{DeclaredType, UploadError, UploadedImage};
