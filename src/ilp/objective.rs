use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::network::{Link, Model, ModelError, NetworkIdx, Node, Resources, Role};

// base cost of rejecting a whole request. The builder adds the dearest placement on top
pub const REJECTION_COST:f64 = 1e6;

#[derive(Error,Debug,Clone,PartialEq,Eq)]
#[error("unknown objective {0}")]
pub struct UnknownObjective(pub String);

#[derive(Debug,Clone,Copy,PartialEq,Eq,Default,Serialize,Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Objective {
    #[default]
    TotalPathCost,
    TotalCommA,
    TotalCommB,
    TotalCommC,
    TotalCommD
}

const NAMES:[(Objective,&str);5] = [
    (Objective::TotalPathCost,"total-path-cost"),
    (Objective::TotalCommA,"total-comm-a"),
    (Objective::TotalCommB,"total-comm-b"),
    (Objective::TotalCommC,"total-comm-c"),
    (Objective::TotalCommD,"total-comm-d"),
];

impl Display for Objective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = NAMES.iter().find(|(o,_)| o == self).map(|(_,n)| *n).unwrap_or("?");
        write!(f,"{name}")
    }
}

impl FromStr for Objective {
    type Err = UnknownObjective;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NAMES.iter()
            .find(|(_,n)| n.eq_ignore_ascii_case(s))
            .map(|(o,_)| *o)
            .ok_or_else(|| UnknownObjective(s.to_owned()))
    }
}

// mean of the per dimension leftover share, only over dimensions the host has
fn fill_ratio(demand:&Resources,host:&Node) -> f64 {
    let capacity = host.capacity().as_array();
    let residual = host.residual().unwrap_or(Resources::ZERO).as_array();
    let demand = demand.as_array();
    let mut sum = 0.0;
    let mut dims = 0;
    for i in 0..3 {
        if capacity[i] > 0.0 {
            sum += (residual[i] - demand[i]) / capacity[i];
            dims += 1;
        }
    }
    if dims == 0 {0.0} else {sum / dims as f64}
}

// angle in radians between what is asked for and what is left
fn resource_angle(demand:&Resources,host:&Node) -> f64 {
    let d = demand.as_array();
    let r = host.residual().unwrap_or(Resources::ZERO).as_array();
    let dot:f64 = d.iter().zip(r.iter()).map(|(a,b)| a * b).sum();
    let norm_d = d.iter().map(|a| a * a).sum::<f64>().sqrt();
    let norm_r = r.iter().map(|a| a * a).sum::<f64>().sqrt();
    if norm_d == 0.0 || norm_r == 0.0 {
        return 0.0
    }
    (dot / (norm_d * norm_r)).clamp(-1.0,1.0).acos()
}

impl Objective {
    pub fn node_cost(&self,guest:&Node,host:&Node) -> f64 {
        match self {
            Objective::TotalPathCost => match (guest.role(),host.role()) {
                (Role::Switch,Role::Server) => 2.0,
                _ => 1.0
            },
            Objective::TotalCommA | Objective::TotalCommB => 0.0,
            Objective::TotalCommC => fill_ratio(&guest.demand(),host),
            Objective::TotalCommD => resource_angle(&guest.demand(),host)
        }
    }
    // cost of a virtual link whose endpoints share one substrate node
    pub fn link_to_node_cost(&self,_guest:&Link) -> f64 {
        match self {
            Objective::TotalPathCost => 1.0,
            _ => 0.0
        }
    }
    pub fn path_cost(&self,guest:&Link,hops:usize) -> f64 {
        let bandwidth = guest.bandwidth();
        match self {
            Objective::TotalPathCost => Self::hop_penalty(hops),
            Objective::TotalCommA => if hops <= 1 {bandwidth} else {5.0 * bandwidth},
            Objective::TotalCommB | Objective::TotalCommC | Objective::TotalCommD => bandwidth * hops as f64
        }
    }
    // total-path-cost price of an `hops` long path: 2 for one hop, 4^h beyond.
    pub fn hop_penalty(hops:usize) -> f64 {
        if hops <= 1 {
            2.0
        } else {
            4f64.powi(hops.min(i32::MAX as usize) as i32)
        }
    }
}

#[derive(Debug,Clone,Copy,PartialEq,Eq,Default,Serialize,Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectionCost {
    #[default]
    Static,
    // scaled by the requested resources plus requested bandwidth, never below
    // the static cost
    ResourceScaled
}

impl RejectionCost {
    pub fn cost(&self,model:&Model,guest:NetworkIdx) -> Result<f64,ModelError> {
        match self {
            RejectionCost::Static => Ok(REJECTION_COST),
            RejectionCost::ResourceScaled => {
                let network = model.network(guest)?;
                let mut footprint = 0.0;
                for node in network.nodes() {
                    footprint += model.node(*node)?.demand().total();
                }
                for link in network.links() {
                    footprint += model.link(*link)?.bandwidth();
                }
                Ok(REJECTION_COST * footprint.max(1.0))
            }
        }
    }
}
