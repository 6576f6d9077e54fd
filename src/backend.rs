//! Backend abstraction - Multi-backend support
//!
//! Grad-CAM needs gradients, so every backend exposed here is wrapped in
//! `Autodiff`. CUDA is used when the `cuda` feature is enabled, NdArray (CPU)
//! otherwise.

use burn::backend::Autodiff;

// --------------------------------------------------------------------------------
// BACKEND SELECTION: CUDA (preferred) or NdArray (fallback)
// --------------------------------------------------------------------------------

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(not(feature = "cuda"))]
pub type DefaultBackend = burn_ndarray::NdArray;

/// The autodiff backend used for analysis (forward + Grad-CAM backward)
pub type AnalysisBackend = Autodiff<DefaultBackend>;

/// Get the default device
pub fn default_device() -> <AnalysisBackend as burn::tensor::backend::Backend>::Device {
    <AnalysisBackend as burn::tensor::backend::Backend>::Device::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(not(feature = "cuda"))]
    {
        "NdArray (CPU)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_available() {
        let _device = default_device();
        assert!(!backend_name().is_empty());
    }
}
