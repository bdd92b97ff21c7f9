use crate::detection::domain::face_detector::Delegate;

/// Execution providers to register for the requested delegate.
///
/// `Gpu` maps to the platform accelerator (CoreML on macOS, DirectML on
/// Windows). ONNX Runtime falls back to its CPU provider when the list is
/// empty or a provider fails to register, so `Cpu` simply registers nothing.
pub fn execution_providers_for(
    delegate: Delegate,
) -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    match delegate {
        Delegate::Gpu => preferred_gpu_providers(),
        Delegate::Cpu => Vec::new(),
    }
}

fn preferred_gpu_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        log::debug!("No GPU execution provider on this platform; using CPU");
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_delegate_registers_nothing() {
        assert!(execution_providers_for(Delegate::Cpu).is_empty());
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    #[test]
    fn test_gpu_delegate_without_accelerator_falls_back() {
        assert!(execution_providers_for(Delegate::Gpu).is_empty());
    }
}
