use std::fmt;
use std::str::FromStr;

/// Square input resolution of the stock ImageNet classifiers.
pub const DEFAULT_INPUT_SIZE: (u32, u32) = (224, 224);

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Per-channel normalization applied after scaling pixels to `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Normalization {
    /// Plain `[0, 1]` values.
    #[default]
    None,
    /// `(x - mean) / std` with the ImageNet statistics.
    ImageNet,
}

impl FromStr for Normalization {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" => Ok(Normalization::None),
            "imagenet" => Ok(Normalization::ImageNet),
            other => anyhow::bail!("Unknown normalization '{other}' (expected 'none' or 'imagenet')"),
        }
    }
}

impl fmt::Display for Normalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Normalization::None => f.write_str("none"),
            Normalization::ImageNet => f.write_str("imagenet"),
        }
    }
}
