// named changes to a binary optimisation model
// every entity is addressed by name, so a delta can refer to rows and columns
// created by earlier deltas

#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum Sense {
    LessEqual,
    Equal
}

#[derive(Debug,Clone,PartialEq)]
pub struct VariableDef {
    pub name:String,
    pub cost:f64
}

#[derive(Debug,Clone,PartialEq)]
pub struct ConstraintDef {
    pub name:String,
    pub sense:Sense,
    pub rhs:f64
}

// coefficient of `variable` in `constraint`. The variable may be defined by
// a later delta. Until then it counts as zero.
#[derive(Debug,Clone,PartialEq)]
pub struct TermDef {
    pub constraint:String,
    pub variable:String,
    pub coefficient:f64
}

#[derive(Debug,Clone,PartialEq,Default)]
pub struct OptimizationDelta {
    pub variables:Vec<VariableDef>,
    pub constraints:Vec<ConstraintDef>,
    pub terms:Vec<TermDef>,
    // (variable, new cost)
    pub cost_updates:Vec<(String,f64)>,
    // (constraint, new right hand side)
    pub rhs_updates:Vec<(String,f64)>,
    // (group, member): at most one member of a group is set
    pub sos1:Vec<(String,String)>,
    pub removed_variables:Vec<String>,
    pub removed_constraints:Vec<String>
}

impl OptimizationDelta {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
            && self.constraints.is_empty()
            && self.terms.is_empty()
            && self.cost_updates.is_empty()
            && self.rhs_updates.is_empty()
            && self.sos1.is_empty()
            && self.removed_variables.is_empty()
            && self.removed_constraints.is_empty()
    }
    pub fn len(&self) -> usize {
        self.variables.len()
            + self.constraints.len()
            + self.terms.len()
            + self.cost_updates.len()
            + self.rhs_updates.len()
            + self.sos1.len()
            + self.removed_variables.len()
            + self.removed_constraints.len()
    }
}
