//! Runtime image resolution: present → pull → build.
//!
//! The same order applies to the built-in image and to an operator-supplied one.
//! They differ in the reference and in where the build context lives.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use skillpod_core::config::SandboxConfig;

use crate::error::{Result, RuntimeError, SandboxError};
use crate::runtime::{BuildContext, ContainerRuntime};

/// Built-in image reference used when no operator image is configured.
pub const DEFAULT_IMAGE: &str = "ghcr.io/skillpod/skillpod-runtime:latest";
/// Build context directory name for operator images, relative to the workspace.
pub const DEFAULT_CONTEXT_DIR: &str = "docker";

/// Which image to use and whether the operator chose it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    pub reference: String,
    pub operator_supplied: bool,
}

impl ImageSpec {
    pub fn from_config(config: &SandboxConfig) -> Self {
        match config.image.as_deref().map(str::trim) {
            Some(image) if !image.is_empty() => Self {
                reference: image.to_string(),
                operator_supplied: true,
            },
            _ => Self {
                reference: DEFAULT_IMAGE.to_string(),
                operator_supplied: false,
            },
        }
    }
}

/// How the image became available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageAvailability {
    Present,
    Pulled,
    Built,
}

/// Dockerfile of the built-in image, relative to a skillpod source checkout.
pub const SOURCE_DOCKERFILE: &str = "docker/Dockerfile";

/// Built-in image context rooted at a skillpod source checkout.
pub fn source_build_context(root: &Path) -> BuildContext {
    BuildContext::dir(root).with_dockerfile(root.join(SOURCE_DOCKERFILE))
}

/// The checkout this binary was compiled from, if it is still on disk.
pub fn compiled_source_root() -> Option<PathBuf> {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..");
    root.join(SOURCE_DOCKERFILE).is_file().then_some(root)
}

/// Build context for `spec`.
///
/// Operator images build from `<workspace>/<SKILLPOD_BUILD_CONTEXT or "docker">`.
/// The built-in image builds the execution server from source: the checkout named
/// by `SKILLPOD_BUILD_CONTEXT`, else the one this binary was compiled from. `None`
/// when neither is available; the image must then be pullable.
pub fn build_context_for(spec: &ImageSpec, config: &SandboxConfig) -> Option<BuildContext> {
    if spec.operator_supplied {
        let relative = config
            .build_context
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTEXT_DIR));
        return Some(BuildContext::dir(config.workspace.join(relative)));
    }
    config
        .build_context
        .clone()
        .or_else(compiled_source_root)
        .map(|root| source_build_context(&root))
}

pub struct ImageResolver {
    runtime: Arc<dyn ContainerRuntime>,
    spec: ImageSpec,
    build_context: Option<BuildContext>,
    /// Serializes resolution so prewarm and a concurrent ensure do not pull twice.
    gate: Mutex<()>,
}

impl ImageResolver {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        spec: ImageSpec,
        build_context: Option<BuildContext>,
    ) -> Self {
        Self {
            runtime,
            spec,
            build_context,
            gate: Mutex::new(()),
        }
    }

    pub fn from_config(runtime: Arc<dyn ContainerRuntime>, config: &SandboxConfig) -> Self {
        let spec = ImageSpec::from_config(config);
        let context = build_context_for(&spec, config);
        Self::new(runtime, spec, context)
    }

    pub fn spec(&self) -> &ImageSpec {
        &self.spec
    }

    pub fn reference(&self) -> &str {
        &self.spec.reference
    }

    pub fn build_context(&self) -> Option<&BuildContext> {
        self.build_context.as_ref()
    }

    /// Make the image available locally.
    pub async fn resolve(&self) -> Result<ImageAvailability> {
        let _guard = self.gate.lock().await;
        let image = self.spec.reference.as_str();

        if self.runtime.image_exists(image).await? {
            tracing::debug!(image, "image present locally");
            return Ok(ImageAvailability::Present);
        }

        tracing::info!(image, operator = self.spec.operator_supplied, "pulling image");
        let pull_error = match self.runtime.pull_image(image).await {
            Ok(()) => {
                tracing::info!(image, "image pulled");
                return Ok(ImageAvailability::Pulled);
            }
            Err(e @ RuntimeError::Unavailable { .. }) => return Err(e.into()),
            Err(e) => e,
        };

        let Some(context) = &self.build_context else {
            return Err(SandboxError::ImageResolutionFailed {
                image: image.to_string(),
                reason: format!(
                    "pull failed ({}); no build context available, set SKILLPOD_BUILD_CONTEXT \
                     to a skillpod source checkout",
                    pull_error
                ),
            });
        };
        tracing::warn!(
            image,
            error = %pull_error,
            context = %context,
            "pull failed, building from local context"
        );
        match self.runtime.build_image(image, context).await {
            Ok(()) => {
                tracing::info!(image, "image built");
                Ok(ImageAvailability::Built)
            }
            Err(e @ RuntimeError::Unavailable { .. }) => Err(e.into()),
            Err(build_error) => Err(SandboxError::ImageResolutionFailed {
                image: image.to_string(),
                reason: format!(
                    "pull failed ({}); build from {} failed ({})",
                    pull_error, context, build_error
                ),
            }),
        }
    }

    /// Resolve in the background. Failures are logged, never returned.
    pub fn prewarm(self: &Arc<Self>) -> JoinHandle<()> {
        let resolver = Arc::clone(self);
        tokio::spawn(async move {
            match resolver.resolve().await {
                Ok(availability) => {
                    tracing::debug!(image = resolver.reference(), ?availability, "prewarm done")
                }
                Err(e) => {
                    tracing::warn!(image = resolver.reference(), error = %e, "prewarm failed")
                }
            }
        })
    }
}
