//! Continuous CPU profiling with tag-scoped annotation.
//!
//! # Design Decisions
//! - Callers hold a [`ProfilerHandle`] whether or not the agent started; the
//!   handle forwards to a [`ProfileTagger`] that is either the live agent or
//!   a no-op, so call sites never branch on profiler state
//! - Tags are per-thread in the agent, so a [`TagScope`] cannot leave the
//!   thread that created it; async code uses [`ProfilerHandle::in_scope`]

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::TelemetryConfig;
use crate::telemetry::endpoint::Endpoint;
use crate::telemetry::error::{Signal, SignalStatus, TelemetryError};

/// Capability to annotate profiling samples of the calling thread.
pub trait ProfileTagger: Send + Sync {
    fn add_tags(&self, tags: &[(String, String)]);
    fn remove_tags(&self, tags: &[(String, String)]);
    fn shutdown(&self) {}
}

/// Tagger used when no agent is running.
#[derive(Debug, Default)]
pub struct NoopTagger;

impl ProfileTagger for NoopTagger {
    fn add_tags(&self, _tags: &[(String, String)]) {}
    fn remove_tags(&self, _tags: &[(String, String)]) {}
}

#[cfg(feature = "profiling")]
mod agent {
    use std::sync::Mutex;

    use pyroscope::pyroscope::PyroscopeAgentRunning;
    use pyroscope::PyroscopeAgent;
    use pyroscope_pprofrs::{pprof_backend, PprofConfig};

    use super::ProfileTagger;
    use crate::telemetry::error::TelemetryError;

    pub struct PyroscopeTagger {
        agent: Mutex<Option<PyroscopeAgent<PyroscopeAgentRunning>>>,
    }

    impl PyroscopeTagger {
        pub fn start(
            server_address: &str,
            application_name: &str,
            sample_rate: u32,
            tags: &[(&str, &str)],
        ) -> Result<Self, TelemetryError> {
            let agent = PyroscopeAgent::builder(server_address, application_name)
                .backend(pprof_backend(PprofConfig::new().sample_rate(sample_rate)))
                .tags(tags.to_vec())
                .build()
                .map_err(|e| TelemetryError::Profiler(e.to_string()))?
                .start()
                .map_err(|e| TelemetryError::Profiler(e.to_string()))?;

            Ok(Self {
                agent: Mutex::new(Some(agent)),
            })
        }

        fn apply(&self, tags: &[(String, String)], add: bool) {
            let Ok(guard) = self.agent.lock() else {
                return;
            };
            let Some(agent) = guard.as_ref() else {
                return;
            };
            let (add_tag, remove_tag) = agent.tag_wrapper();
            for (key, value) in tags {
                let result = if add {
                    add_tag(key.clone(), value.clone())
                } else {
                    remove_tag(key.clone(), value.clone())
                };
                if let Err(e) = result {
                    tracing::debug!(key = %key, error = %e, "Failed to update profile tag");
                }
            }
        }
    }

    impl ProfileTagger for PyroscopeTagger {
        fn add_tags(&self, tags: &[(String, String)]) {
            self.apply(tags, true);
        }

        fn remove_tags(&self, tags: &[(String, String)]) {
            self.apply(tags, false);
        }

        fn shutdown(&self) {
            let running = match self.agent.lock() {
                Ok(mut guard) => guard.take(),
                Err(_) => None,
            };
            if let Some(agent) = running {
                match agent.stop() {
                    Ok(ready) => ready.shutdown(),
                    Err(e) => tracing::warn!(error = %e, "Failed to stop profiler"),
                }
            }
        }
    }
}

/// Handle to the profiling session. Cheap to clone.
#[derive(Clone)]
pub struct ProfilerHandle {
    tagger: Arc<dyn ProfileTagger>,
    status: SignalStatus,
    endpoint: Option<Endpoint>,
}

impl ProfilerHandle {
    /// Start the agent. Any failure leaves the handle permanently untagged.
    pub fn new(config: &TelemetryConfig) -> Self {
        let endpoint = Endpoint::resolve(config, Signal::Profiles);

        if !config.profiling.enabled {
            return Self::unconfigured(SignalStatus::Disabled);
        }

        match start_agent(config, &endpoint) {
            Ok(tagger) => {
                tracing::debug!(endpoint = endpoint.url(), "Profiler started");
                Self {
                    tagger,
                    status: SignalStatus::Ready,
                    endpoint: Some(endpoint),
                }
            }
            Err(e) => Self::unconfigured(SignalStatus::degraded(&e)),
        }
    }

    /// A handle that tags nothing.
    pub fn unconfigured(status: SignalStatus) -> Self {
        Self {
            tagger: Arc::new(NoopTagger),
            status,
            endpoint: None,
        }
    }

    /// A handle backed by a caller-supplied tagger.
    pub fn with_tagger(tagger: Arc<dyn ProfileTagger>) -> Self {
        Self {
            tagger,
            status: SignalStatus::Ready,
            endpoint: None,
        }
    }

    pub fn status(&self) -> &SignalStatus {
        &self.status
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn is_configured(&self) -> bool {
        self.status.is_ready()
    }

    /// Tag samples of the current thread until the returned scope is dropped.
    pub fn tag_wrapper(&self, tags: &[(&str, &str)]) -> TagScope {
        TagScope::new(self.tagger.clone(), owned(tags))
    }

    /// Run `future` with `tags` applied around every poll.
    pub async fn in_scope<F: Future>(&self, tags: &[(&str, &str)], future: F) -> F::Output {
        let tags = owned(tags);
        let mut future = std::pin::pin!(future);
        std::future::poll_fn(|cx| {
            let _scope = TagScope::new(self.tagger.clone(), tags.clone());
            future.as_mut().poll(cx)
        })
        .await
    }

    pub fn shutdown(&self) {
        self.tagger.shutdown();
    }
}

fn owned(tags: &[(&str, &str)]) -> Vec<(String, String)> {
    tags.iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(feature = "profiling")]
fn start_agent(
    config: &TelemetryConfig,
    endpoint: &Endpoint,
) -> Result<Arc<dyn ProfileTagger>, TelemetryError> {
    endpoint.validate(Signal::Profiles)?;
    let version = env!("CARGO_PKG_VERSION");
    let tags = [
        ("service.name", config.service_name.as_str()),
        ("environment", config.environment.as_str()),
        ("version", version),
    ];
    let tagger = agent::PyroscopeTagger::start(
        endpoint.url(),
        &config.profiling.application_name,
        config.profiling.sample_rate,
        &tags,
    )?;
    Ok(Arc::new(tagger))
}

#[cfg(not(feature = "profiling"))]
fn start_agent(
    _config: &TelemetryConfig,
    endpoint: &Endpoint,
) -> Result<Arc<dyn ProfileTagger>, TelemetryError> {
    endpoint.validate(Signal::Profiles)?;
    Err(TelemetryError::Profiler(
        "built without the `profiling` feature".to_string(),
    ))
}

/// Active set of profile tags on the creating thread.
///
/// Not `Send`: the tags belong to the thread that applied them.
pub struct TagScope {
    tagger: Arc<dyn ProfileTagger>,
    tags: Vec<(String, String)>,
    _thread_bound: PhantomData<*const ()>,
}

impl TagScope {
    fn new(tagger: Arc<dyn ProfileTagger>, tags: Vec<(String, String)>) -> Self {
        tagger.add_tags(&tags);
        Self {
            tagger,
            tags,
            _thread_bound: PhantomData,
        }
    }

    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }
}

impl Drop for TagScope {
    fn drop(&mut self) {
        self.tagger.remove_tags(&self.tags);
    }
}
