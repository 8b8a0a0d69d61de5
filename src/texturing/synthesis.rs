//! The external texture synthesis collaborator and its worker
//!
//! A [`TextureSynthesizer`] turns a prompt and an AO guide image into four
//! encoded PBR maps. It usually wraps a network call, so [`SynthesisJobs`]
//! runs it on a worker thread and hands the result back to the session on a
//! later tick. At most one job is in flight; an abandoned job's late result is
//! dropped.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
};

use crossbeam_channel::{Receiver, Sender};

use super::{ao_bake::BakedImage, maps::EncodedMapSet};
use crate::error::{panic_message, SynthesisError, TexturingError};

pub trait TextureSynthesizer: Send + Sync {
    fn synthesize(&self, prompt: &str, guide: &BakedImage) -> Result<EncodedMapSet, SynthesisError>;
}

impl<F> TextureSynthesizer for F
where
    F: Fn(&str, &BakedImage) -> Result<EncodedMapSet, SynthesisError> + Send + Sync,
{
    fn synthesize(&self, prompt: &str, guide: &BakedImage) -> Result<EncodedMapSet, SynthesisError> {
        self(prompt, guide)
    }
}

/// Calls the synthesizer and checks that all four roles came back
pub fn synthesize_checked(
    synthesizer: &dyn TextureSynthesizer,
    prompt: &str,
    guide: &BakedImage,
) -> Result<EncodedMapSet, SynthesisError> {
    let maps = synthesizer.synthesize(prompt, guide)?;
    match maps.missing_role() {
        Some(role) => Err(SynthesisError::ContractViolation(format!(
            "response has no {} map",
            role.key()
        ))),
        None => Ok(maps),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

type JobResult = (JobId, Result<EncodedMapSet, SynthesisError>);

pub struct SynthesisJobs {
    sender: Sender<JobResult>,
    receiver: Receiver<JobResult>,
    current: Option<JobId>,
    next_id: u64,
    discarded: usize,
}

impl SynthesisJobs {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver,
            current: None,
            next_id: 1,
            discarded: 0,
        }
    }

    /// Starts a synthesis on a worker thread
    pub fn start(
        &mut self,
        synthesizer: Arc<dyn TextureSynthesizer>,
        prompt: String,
        guide: BakedImage,
    ) -> Result<JobId, TexturingError> {
        if self.current.is_some() {
            return Err(TexturingError::Busy);
        }
        let job = JobId(self.next_id);
        self.next_id += 1;

        let sender = self.sender.clone();
        log::info!("Synthesis job {} started: {:?}", job.0, prompt);
        thread::Builder::new()
            .name(format!("meshkiln-synthesis-{}", job.0))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    synthesize_checked(synthesizer.as_ref(), &prompt, &guide)
                }))
                .unwrap_or_else(|payload| Err(SynthesisError::Crashed(panic_message(payload.as_ref()))));
                let _ = sender.send((job, result));
            })
            .map_err(|e| SynthesisError::Network(format!("failed to spawn worker: {e}")))?;
        self.current = Some(job);
        Ok(job)
    }

    /// Forgets the job in flight; its result will be discarded
    pub fn abandon(&mut self) {
        if let Some(job) = self.current.take() {
            log::info!("Synthesis job {} abandoned", job.0);
        }
    }

    /// Result of the current job, once it has arrived
    pub fn poll(&mut self) -> Option<Result<EncodedMapSet, SynthesisError>> {
        while let Ok((job, result)) = self.receiver.try_recv() {
            if Some(job) == self.current {
                self.current = None;
                return Some(result);
            }
            log::debug!("Discarding late result of synthesis job {}", job.0);
            self.discarded += 1;
        }
        None
    }

    pub fn in_flight(&self) -> bool {
        self.current.is_some()
    }

    pub fn discarded_results(&self) -> usize {
        self.discarded
    }
}

impl Default for SynthesisJobs {
    fn default() -> Self {
        Self::new()
    }
}
