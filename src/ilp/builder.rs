use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use super::delta::{ConstraintDef, OptimizationDelta, Sense, TermDef, VariableDef};
use super::objective::{Objective, RejectionCost};
use crate::matching::Match;
use crate::network::{LinkIdx, Model, ModelError, NetworkIdx, NodeIdx, PathIdx};

type Result<T> = std::result::Result<T,ModelError>;

// cost changes below this are not worth a delta entry
const COST_EPS:f64 = 1e-12;

struct VariableEntry {
    network:NetworkIdx,
    cost:f64,
    // none for rejection variables
    origin:Option<Match>
}

struct ConstraintEntry {
    // none for substrate capacity rows shared by every request
    owner:Option<NetworkIdx>,
    // exactly one of the terms is picked
    choice:bool,
    terms:BTreeSet<String>
}

pub fn rejection_name(network:&str) -> String {
    format!("reject({network})")
}

// '@' never appears in element names, see `Model::claim_name`
pub fn mapping_name(guest:&str,host:&str) -> String {
    format!("map({guest}@{host})")
}

fn host_row_name(guest:&str) -> String {
    format!("host({guest})")
}

// turns matches into named variables and rows. Keeps a mirror of everything
// it has handed out, so feeding the same match twice changes nothing.
pub struct DeltaBuilder {
    objective:Objective,
    rejection:RejectionCost,
    sos_hints:bool,
    variables:BTreeMap<String,VariableEntry>,
    constraints:BTreeMap<String,ConstraintEntry>,
    // network -> (rejection variable, base cost)
    rejections:BTreeMap<NetworkIdx,(String,f64)>,
    pending:OptimizationDelta
}

impl DeltaBuilder {
    pub fn new(objective:Objective,rejection:RejectionCost,sos_hints:bool) -> Self {
        Self {
            objective,
            rejection,
            sos_hints,
            variables:BTreeMap::new(),
            constraints:BTreeMap::new(),
            rejections:BTreeMap::new(),
            pending:OptimizationDelta::new()
        }
    }
    // the match a mapping variable was created for
    pub fn origin(&self,variable:&str) -> Option<&Match> {
        self.variables.get(variable)?.origin.as_ref()
    }
    pub fn network_of(&self,variable:&str) -> Option<NetworkIdx> {
        self.variables.get(variable).map(|v| v.network)
    }
    pub fn rejection_variable(&self,network:NetworkIdx) -> Option<&str> {
        self.rejections.get(&network).map(|(name,_)| name.as_str())
    }
    pub fn contains_network(&self,network:NetworkIdx) -> bool {
        self.variables.values().any(|v| v.network == network)
    }

    fn ensure_variable(&mut self,name:String,cost:f64,network:NetworkIdx,origin:Option<Match>) {
        if let Some(entry) = self.variables.get_mut(&name) {
            debug_assert_eq!(entry.network,network);
            if (entry.cost - cost).abs() > COST_EPS {
                entry.cost = cost;
                match self.pending.variables.iter_mut().find(|v| v.name == name) {
                    Some(def) => def.cost = cost,
                    None => self.pending.cost_updates.push((name,cost))
                }
            }
            return;
        }
        self.pending.variables.push(VariableDef {name:name.clone(),cost});
        self.variables.insert(name,VariableEntry {network,cost,origin});
    }
    fn ensure_constraint(&mut self,name:&str,sense:Sense,rhs:f64,owner:Option<NetworkIdx>) -> bool {
        if self.constraints.contains_key(name) {
            return false;
        }
        self.pending.constraints.push(ConstraintDef {name:name.to_owned(),sense,rhs});
        self.constraints.insert(name.to_owned(),ConstraintEntry {owner,choice:sense == Sense::Equal,terms:BTreeSet::new()});
        true
    }
    fn ensure_term(&mut self,constraint:&str,variable:&str,coefficient:f64) {
        let Some(entry) = self.constraints.get_mut(constraint) else {
            debug_assert!(false,"term for unknown row {constraint}");
            return;
        };
        if !entry.terms.insert(variable.to_owned()) {
            return;
        }
        self.pending.terms.push(TermDef {
            constraint:constraint.to_owned(),
            variable:variable.to_owned(),
            coefficient
        });
    }
    fn add_sos_member(&mut self,group:&str,variable:&str) {
        if self.sos_hints {
            self.pending.sos1.push((group.to_owned(),variable.to_owned()));
        }
    }
    fn ensure_rejection(&mut self,model:&Model,network:NetworkIdx) -> Result<String> {
        if let Some((name,_)) = self.rejections.get(&network) {
            return Ok(name.clone());
        }
        let name = rejection_name(model.network(network)?.name());
        let base = self.rejection.cost(model,network)?;
        let cost = base + self.placement_bound();
        self.ensure_variable(name.clone(),cost,network,None);
        self.rejections.insert(network,(name.clone(),base));
        Ok(name)
    }
    // every element placed at its dearest candidate, over all known networks
    fn placement_bound(&self) -> f64 {
        let mut bound = 1.0;
        for row in self.constraints.values().filter(|c| c.choice) {
            let dearest = row.terms.iter()
                .filter_map(|name| self.variables.get(name))
                .filter(|v| v.origin.is_some())
                .map(|v| v.cost.max(0.0))
                .fold(0.0,f64::max);
            bound += dearest;
        }
        bound
    }
    // a rejection always costs more than any placement the rows allow
    fn refresh_rejections(&mut self) {
        let bound = self.placement_bound();
        let rejections:Vec<(NetworkIdx,String,f64)> = self.rejections.iter()
            .map(|(network,(name,base))| (*network,name.clone(),base + bound))
            .collect();
        for (network,name,cost) in rejections {
            self.ensure_variable(name,cost,network,None);
        }
    }
    // sum of mappings + reject = 1 for one virtual element
    fn ensure_host_row(&mut self,model:&Model,guest:&str,network:NetworkIdx) -> Result<String> {
        let row = host_row_name(guest);
        let reject = self.ensure_rejection(model,network)?;
        if self.ensure_constraint(&row,Sense::Equal,1.0,Some(network)) {
            self.ensure_term(&row,&reject,1.0);
            self.add_sos_member(&row,&reject);
        }
        Ok(row)
    }
    fn join_host_row(&mut self,row:&str,variable:&str) {
        let fresh = self.constraints.get(row).is_some_and(|c| !c.terms.contains(variable));
        self.ensure_term(row,variable,1.0);
        if fresh {
            self.add_sos_member(row,variable);
        }
    }
    // y - x <= 0: the link mapping needs the endpoint mapping
    fn ensure_consistency(&mut self,row:String,link_var:&str,node_var:&str,network:NetworkIdx) {
        self.ensure_constraint(&row,Sense::LessEqual,0.0,Some(network));
        self.ensure_term(&row,link_var,1.0);
        self.ensure_term(&row,node_var,-1.0);
    }

    pub fn add_match(&mut self,model:&Model,candidate:&Match) -> Result<()> {
        match *candidate {
            Match::Network { guest, .. } => self.add_network(model,guest),
            Match::Node { guest, host } => self.add_node(model,candidate,guest,host,true),
            Match::Switch { guest, host } => self.add_node(model,candidate,guest,host,false),
            Match::LinkToNode { guest, host } => {
                let link = model.link(guest)?;
                let network = link.network();
                let host_name = model.node(host)?.name();
                let var = mapping_name(link.name(),host_name);
                let cost = self.objective.link_to_node_cost(link);
                let row = self.ensure_host_row(model,link.name(),network)?;
                self.ensure_variable(var.clone(),cost,network,Some(*candidate));
                self.join_host_row(&row,&var);
                let from = mapping_name(model.node(link.source())?.name(),host_name);
                let to = mapping_name(model.node(link.target())?.name(),host_name);
                self.ensure_consistency(format!("src({var})"),&var,&from,network);
                self.ensure_consistency(format!("dst({var})"),&var,&to,network);
                Ok(())
            },
            Match::LinkToPath { guest, host } => self.add_path(model,candidate,guest,host)
        }
    }

    fn add_network(&mut self,model:&Model,guest:NetworkIdx) -> Result<()> {
        self.ensure_rejection(model,guest)?;
        let network = model.network(guest)?;
        for node in network.nodes() {
            self.ensure_host_row(model,model.node(*node)?.name(),guest)?;
        }
        for link in network.links() {
            self.ensure_host_row(model,model.link(*link)?.name(),guest)?;
        }
        Ok(())
    }

    fn add_node(&mut self,model:&Model,candidate:&Match,guest:NodeIdx,host:NodeIdx,with_footprint:bool) -> Result<()> {
        let virtual_node = model.node(guest)?;
        let substrate_node = model.node(host)?;
        let network = virtual_node.network();
        let var = mapping_name(virtual_node.name(),substrate_node.name());
        let cost = self.objective.node_cost(virtual_node,substrate_node);
        let row = self.ensure_host_row(model,virtual_node.name(),network)?;
        self.ensure_variable(var.clone(),cost,network,Some(*candidate));
        self.join_host_row(&row,&var);
        if !with_footprint {
            return Ok(())
        }
        let demand = virtual_node.demand().as_array();
        let residual = substrate_node.residual().unwrap_or_default().as_array();
        for (i,prefix) in ["cpu","mem","sto"].iter().enumerate() {
            if demand[i] <= 0.0 {
                continue;
            }
            let row = format!("{prefix}({})",substrate_node.name());
            self.ensure_constraint(&row,Sense::LessEqual,residual[i],None);
            self.ensure_term(&row,&var,demand[i]);
        }
        Ok(())
    }

    fn add_path(&mut self,model:&Model,candidate:&Match,guest:LinkIdx,host:PathIdx) -> Result<()> {
        let link = model.link(guest)?;
        let path = model.path(host)?;
        let network = link.network();
        let var = mapping_name(link.name(),path.name());
        let cost = self.objective.path_cost(link,path.hop_count());
        let row = self.ensure_host_row(model,link.name(),network)?;
        self.ensure_variable(var.clone(),cost,network,Some(*candidate));
        self.join_host_row(&row,&var);
        if link.bandwidth() > 0.0 {
            for substrate_link in path.links() {
                let substrate_link = model.link(*substrate_link)?;
                let row = format!("bw({})",substrate_link.name());
                self.ensure_constraint(&row,Sense::LessEqual,substrate_link.residual().unwrap_or(0.0),None);
                self.ensure_term(&row,&var,link.bandwidth());
            }
        }
        let from = mapping_name(model.node(link.source())?.name(),model.node(path.source())?.name());
        let to = mapping_name(model.node(link.target())?.name(),model.node(path.target())?.name());
        self.ensure_consistency(format!("src({var})"),&var,&from,network);
        self.ensure_consistency(format!("dst({var})"),&var,&to,network);
        Ok(())
    }

    // everything added since the last call
    pub fn take_delta(&mut self) -> OptimizationDelta {
        self.refresh_rejections();
        let delta = std::mem::take(&mut self.pending);
        debug!(
            variables = delta.variables.len(),
            constraints = delta.constraints.len(),
            terms = delta.terms.len(),
            cost_updates = delta.cost_updates.len(),
            "delta taken"
        );
        delta
    }

    // forgets every variable and row of `network`. The returned delta carries
    // anything still pending plus the removals.
    pub fn remove_network(&mut self,network:NetworkIdx) -> OptimizationDelta {
        let variables:Vec<String> = self.variables.iter()
            .filter(|(_,v)| v.network == network)
            .map(|(name,_)| name.clone())
            .collect();
        for name in variables.iter() {
            self.variables.remove(name);
        }
        let rows:Vec<String> = self.constraints.iter()
            .filter(|(_,c)| c.owner == Some(network))
            .map(|(name,_)| name.clone())
            .collect();
        for name in rows.iter() {
            self.constraints.remove(name);
        }
        for entry in self.constraints.values_mut() {
            for name in variables.iter() {
                entry.terms.remove(name);
            }
        }
        self.rejections.remove(&network);
        self.refresh_rejections();
        let mut delta = std::mem::take(&mut self.pending);
        trace!(network, variables = variables.len(), rows = rows.len(), "network removed from model");
        delta.removed_variables = variables;
        delta.removed_constraints = rows;
        delta
    }
}
