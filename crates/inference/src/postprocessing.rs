use std::fmt;

/// Class index treated as flagged content.
///
/// Stock ImageNet classifiers know nothing about this label; index 1 is a
/// placeholder until a purpose-trained model is wired in.
pub const FLAGGED_CLASS_INDEX: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Nsfw,
    Safe,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Nsfw => "NSFW",
            Verdict::Safe => "SAFE",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub class_index: usize,
    /// Raw logit of the winning class.
    pub score: f32,
    pub verdict: Verdict,
}

pub struct PostProcessor {
    pub flagged_class: usize,
}

impl PostProcessor {
    pub fn new(flagged_class: usize) -> Self {
        Self { flagged_class }
    }

    /// Argmax over the class dimension of a `[1, num_classes]` output.
    #[tracing::instrument(skip(self, logits), fields(shape = ?logits.shape()))]
    pub fn classify(&self, logits: &ndarray::ArrayViewD<f32>) -> anyhow::Result<Prediction> {
        let shape = logits.shape();
        if shape.len() != 2 || shape[0] != 1 || shape[1] == 0 {
            anyhow::bail!(
                "Unexpected classifier output shape {:?}, expected [1, num_classes]",
                shape
            );
        }

        let (class_index, score) =
            argmax(logits.iter().copied()).ok_or_else(|| anyhow::anyhow!("Empty logits"))?;

        let verdict = if class_index == self.flagged_class {
            Verdict::Nsfw
        } else {
            Verdict::Safe
        };

        Ok(Prediction {
            class_index,
            score,
            verdict,
        })
    }
}

impl Default for PostProcessor {
    fn default() -> Self {
        Self::new(FLAGGED_CLASS_INDEX)
    }
}

/// Index of the largest value; the first one wins on ties and NaN counts as
/// the maximum, matching `torch.argmax`.
fn argmax(values: impl IntoIterator<Item = f32>) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, value) in values.into_iter().enumerate() {
        if value.is_nan() {
            return Some((idx, value));
        }
        match best {
            Some((_, max)) if value <= max => {}
            _ => best = Some((idx, value)),
        }
    }
    best
}
