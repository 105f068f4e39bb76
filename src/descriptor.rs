//! Fixed-length face feature vectors.

use serde::{Deserialize, Serialize};

use crate::error::FaceError;

/// Number of components in a face descriptor.
pub const DESCRIPTOR_LEN: usize = 128;

/// A 128-component face embedding.
///
/// Only reachable through [`FeatureVector::new`] (or deserialisation, which
/// calls it), so every value in circulation has the right length and finite
/// components.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct FeatureVector(Box<[f32; DESCRIPTOR_LEN]>);

impl FeatureVector {
    pub fn new(components: Vec<f32>) -> Result<Self, FaceError> {
        if components.len() != DESCRIPTOR_LEN {
            return Err(FaceError::MalformedInput(format!(
                "descriptor must have {DESCRIPTOR_LEN} elements, got {}",
                components.len()
            )));
        }
        if let Some(pos) = components.iter().position(|c| !c.is_finite()) {
            return Err(FaceError::MalformedInput(format!(
                "descriptor element {pos} is not a finite number"
            )));
        }

        let boxed: Box<[f32; DESCRIPTOR_LEN]> = components
            .into_boxed_slice()
            .try_into()
            .map_err(|_| FaceError::MalformedInput("descriptor length changed".into()))?;
        Ok(Self(boxed))
    }

    /// Parse the canonical JSON numeric-array representation.
    pub fn from_json(bytes: &[u8]) -> Result<Self, FaceError> {
        let components: Vec<f32> = serde_json::from_slice(bytes)?;
        Self::new(components)
    }

    pub fn to_json(&self) -> Vec<u8> {
        // a slice of finite floats always serialises
        serde_json::to_vec(self.as_slice()).unwrap_or_default()
    }

    pub fn as_slice(&self) -> &[f32] {
        self.0.as_slice()
    }

    /// Euclidean distance, accumulated in `f64`.
    pub fn distance(&self, other: &FeatureVector) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| {
                let d = f64::from(*a) - f64::from(*b);
                d * d
            })
            .sum::<f64>()
            .sqrt()
    }
}

impl TryFrom<Vec<f32>> for FeatureVector {
    type Error = FaceError;

    fn try_from(components: Vec<f32>) -> Result<Self, Self::Error> {
        Self::new(components)
    }
}

impl From<FeatureVector> for Vec<f32> {
    fn from(vector: FeatureVector) -> Self {
        vector.0.to_vec()
    }
}

#[cfg(test)]
pub(crate) fn sample_vector(seed: u32) -> FeatureVector {
    let components = (0..DESCRIPTOR_LEN as u32)
        .map(|i| ((i.wrapping_mul(31).wrapping_add(seed.wrapping_mul(17))) % 97) as f32 / 97.0 - 0.5)
        .collect();
    FeatureVector::new(components).unwrap()
}
