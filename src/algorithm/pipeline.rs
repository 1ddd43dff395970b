use tracing::{debug, info};

use super::{AttemptState, EmbeddingAlgorithm};
use crate::error::{EmbeddingError, Result};
use crate::network::{Model, NetworkIdx};

// ordered fallbacks. Stages run until one embeds the request; a stage that
// fails leaves the model as it found it, so the next one starts clean.
pub struct Pipeline {
    stages:Vec<Box<dyn EmbeddingAlgorithm>>,
    state:AttemptState,
    winner:Option<usize>
}

impl Pipeline {
    pub fn new() -> Self {
        Self {stages:vec![],state:AttemptState::Idle,winner:None}
    }
    pub fn with_stage(mut self,stage:Box<dyn EmbeddingAlgorithm>) -> Self {
        self.stages.push(stage);
        self
    }
    pub fn len(&self) -> usize {
        self.stages.len()
    }
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
    // name of the stage that embedded the last request
    pub fn winner(&self) -> Option<&str> {
        self.winner.and_then(|i| self.stages.get(i)).map(|s| s.name())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingAlgorithm for Pipeline {
    fn name(&self) -> &str {
        "pipeline"
    }

    fn prepare(&mut self,model:&Model,substrate:NetworkIdx,requests:&[NetworkIdx]) -> Result<()> {
        if self.stages.is_empty() {
            return Err(EmbeddingError::NoStages)
        }
        for stage in self.stages.iter_mut() {
            stage.prepare(model,substrate,requests)?;
        }
        self.winner = None;
        self.state = AttemptState::Prepared;
        Ok(())
    }

    fn execute(&mut self,model:&mut Model) -> Result<bool> {
        if self.state == AttemptState::Idle {
            return Err(EmbeddingError::NotPrepared)
        }
        for (i,stage) in self.stages.iter_mut().enumerate() {
            if stage.execute(model)? {
                info!(stage = %stage.name(), index = i, "pipeline stage embedded the request");
                self.winner = Some(i);
                self.state = AttemptState::Applied;
                return Ok(true)
            }
            debug!(stage = %stage.name(), index = i, "pipeline stage failed");
        }
        self.state = AttemptState::Rejected;
        Ok(false)
    }

    fn state(&self) -> AttemptState {
        self.state
    }
}
