// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Defines the hierarchy of error types for the rendering subsystem.
//!
//! Capacity overflows, invalid indices and double frees are programming
//! errors and panic at the call site. The types here cover what a device can
//! legitimately refuse to do.

use crate::graph::CycleError;
use std::fmt;

/// An error related to the creation of a pipeline.
#[derive(Debug)]
pub enum PipelineError {
    /// The named shader is not known to the backend.
    ShaderNotFound(String),
    /// The backend failed to build the pipeline state object.
    CompilationFailed {
        /// A descriptive label for the pipeline, if available.
        label: Option<String>,
        /// Detailed error messages from the backend.
        details: String,
    },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::ShaderNotFound(name) => write!(f, "Shader '{name}' not found"),
            PipelineError::CompilationFailed { label, details } => {
                write!(
                    f,
                    "Pipeline compilation failed for '{}': {}",
                    label.as_deref().unwrap_or("Unknown"),
                    details
                )
            }
        }
    }
}

impl std::error::Error for PipelineError {}

/// An error related to the creation or use of a GPU resource.
#[derive(Debug)]
pub enum ResourceError {
    /// A pipeline-specific error occurred.
    Pipeline(PipelineError),
    /// A generic resource could not be found.
    NotFound,
    /// The handle or ID used to reference a resource is invalid.
    InvalidHandle,
    /// The device ran out of memory for the request.
    OutOfMemory {
        /// Bytes requested.
        requested: u64,
    },
    /// An error originating from the specific graphics backend implementation.
    BackendError(String),
    /// An attempt was made to access a resource out of its bounds.
    OutOfBounds,
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::Pipeline(err) => write!(f, "Pipeline resource error: {err}"),
            ResourceError::NotFound => write!(f, "Resource not found with ID."),
            ResourceError::InvalidHandle => write!(f, "Invalid resource handle or ID."),
            ResourceError::OutOfMemory { requested } => {
                write!(f, "Out of device memory allocating {requested} bytes.")
            }
            ResourceError::BackendError(msg) => {
                write!(f, "Backend-specific resource error: {msg}")
            }
            ResourceError::OutOfBounds => write!(f, "Resource access out of bounds."),
        }
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResourceError::Pipeline(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PipelineError> for ResourceError {
    fn from(err: PipelineError) -> Self {
        ResourceError::Pipeline(err)
    }
}

/// A high-level error raised while building or driving the renderer.
#[derive(Debug)]
pub enum RenderError {
    /// An error occurred while managing a GPU resource.
    ResourceError(ResourceError),
    /// The declared pass dependencies contain a cycle.
    PassCycle(String),
    /// The configuration is unusable.
    InvalidConfig(String),
    /// The graphics device was lost.
    DeviceLost,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::ResourceError(err) => {
                write!(f, "Graphics resource operation failed: {err}")
            }
            RenderError::PassCycle(msg) => write!(f, "Invalid pass schedule: {msg}"),
            RenderError::InvalidConfig(msg) => write!(f, "Invalid renderer configuration: {msg}"),
            RenderError::DeviceLost => write!(
                f,
                "The graphics device was lost and needs to be reinitialized."
            ),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::ResourceError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for RenderError {
    fn from(err: ResourceError) -> Self {
        RenderError::ResourceError(err)
    }
}

impl<T: fmt::Debug> From<CycleError<T>> for RenderError {
    fn from(err: CycleError<T>) -> Self {
        RenderError::PassCycle(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn resource_error_display_wrapping_pipeline_error() {
        let res_err: ResourceError = PipelineError::ShaderNotFound("gpu_culling".into()).into();
        assert_eq!(
            format!("{res_err}"),
            "Pipeline resource error: Shader 'gpu_culling' not found"
        );
        assert!(res_err.source().is_some());
    }

    #[test]
    fn render_error_chains_sources() {
        let render_err: RenderError = ResourceError::OutOfMemory { requested: 64 }.into();
        assert_eq!(
            format!("{render_err}"),
            "Graphics resource operation failed: Out of device memory allocating 64 bytes."
        );
        assert!(render_err.source().is_some());
    }

    #[test]
    fn cycle_becomes_pass_cycle() {
        let err: RenderError = CycleError { unresolved: vec![1, 2] }.into();
        assert!(matches!(err, RenderError::PassCycle(_)));
    }
}
