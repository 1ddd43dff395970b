use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ilp::{Objective, RejectionCost, REJECTION_COST};
use crate::paths::{PathConfig, PathError};

#[derive(Error,Debug,Clone,PartialEq)]
pub enum ConfigError {
    #[error(transparent)]
    Paths(#[from] PathError),
    #[error("migration needs at least one try")]
    ZeroMigrationTries,
    #[error("{objective} prices a {max_hops} hop path at {cost}, which is not below the rejection cost")]
    UnencodableHopCost{objective:Objective,max_hops:usize,cost:f64},
}

// everything an embedding run can be tuned with. Owned by the caller and
// handed to each algorithm by value.
#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EngineConfig {
    pub objective:Objective,
    pub paths:PathConfig,
    pub migration_tries:usize,
    pub sos_hints:bool,
    pub rejection_cost:RejectionCost,
    pub time_limit:Option<Duration>
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            objective:Objective::TotalPathCost,
            paths:PathConfig::default(),
            migration_tries:1,
            sos_hints:false,
            rejection_cost:RejectionCost::Static,
            time_limit:None
        }
    }
}

impl EngineConfig {
    pub fn with_objective(self,objective:Objective) -> Self {
        Self {objective,..self}
    }
    pub fn with_paths(self,paths:PathConfig) -> Self {
        Self {paths,..self}
    }
    pub fn with_migration_tries(self,migration_tries:usize) -> Self {
        Self {migration_tries,..self}
    }
    pub fn with_sos_hints(self,sos_hints:bool) -> Self {
        Self {sos_hints,..self}
    }
    pub fn with_rejection_cost(self,rejection_cost:RejectionCost) -> Self {
        Self {rejection_cost,..self}
    }
    pub fn with_time_limit(self,time_limit:Duration) -> Self {
        Self {time_limit:Some(time_limit),..self}
    }

    pub fn validate(&self) -> Result<(),ConfigError> {
        self.paths.validate()?;
        if self.migration_tries == 0 {
            return Err(ConfigError::ZeroMigrationTries)
        }
        match self.paths.max_hops {
            Some(max_hops) => self.check_hop_cost(max_hops),
            None => Ok(())
        }
    }
    // the dearest path the objective may see must stay below the base rejection cost
    pub fn check_hop_cost(&self,max_hops:usize) -> Result<(),ConfigError> {
        if self.objective != Objective::TotalPathCost {
            return Ok(())
        }
        let cost = Objective::hop_penalty(max_hops);
        if cost >= REJECTION_COST {
            return Err(ConfigError::UnencodableHopCost { objective:self.objective,max_hops,cost })
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::PathMode;

    #[test]
    fn test_validation() {
        assert!(EngineConfig::default().validate().is_ok());
        assert_eq!(
            EngineConfig::default().with_migration_tries(0).validate(),
            Err(ConfigError::ZeroMigrationTries)
        );
        let zero_k = EngineConfig::default().with_paths(PathConfig::k_shortest(0));
        assert_eq!(zero_k.validate(),Err(ConfigError::Paths(PathError::ZeroK)));
        // 4^10 passes 1e6
        let long = EngineConfig::default().with_paths(PathConfig::shortest().with_max_hops(10));
        assert!(matches!(long.validate(),Err(ConfigError::UnencodableHopCost{max_hops:10,..})));
        assert!(long.with_objective(Objective::TotalCommA).validate().is_ok());
        let nine = EngineConfig::default().with_paths(PathConfig::shortest().with_max_hops(9));
        assert!(nine.validate().is_ok());
        assert!(nine.check_hop_cost(12).is_err());
        assert!(EngineConfig::default().with_objective(Objective::TotalCommB).check_hop_cost(12).is_ok());
    }

    #[test]
    fn test_serde_round_trip() {
        let config = EngineConfig::default()
            .with_objective(Objective::TotalCommD)
            .with_paths(PathConfig::k_shortest(3).with_max_hops(4))
            .with_sos_hints(true)
            .with_rejection_cost(RejectionCost::ResourceScaled)
            .with_time_limit(Duration::from_secs(2));
        let text = serde_json::to_string(&config).unwrap();
        assert!(text.contains("\"total-comm-d\""));
        assert!(text.contains("\"resource-scaled\""));
        assert!(text.contains("\"migration-tries\""));
        let back:EngineConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back,config);
        assert_eq!(back.paths.mode,PathMode::KShortest(3));

        let partial:EngineConfig = serde_json::from_str(r#"{"objective":"total-comm-a"}"#).unwrap();
        assert_eq!(partial,EngineConfig::default().with_objective(Objective::TotalCommA));
    }
}
