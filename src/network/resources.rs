use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use super::EPS;

// the three server dimensions. Switches carry `Resources::ZERO`.
#[derive(Debug,Clone,Copy,PartialEq,Default,Serialize,Deserialize)]
pub struct Resources {
    pub cpu:f64,
    pub memory:f64,
    pub storage:f64
}

impl Resources {
    pub const ZERO:Self = Self {cpu:0.0,memory:0.0,storage:0.0};

    pub const fn new(cpu:f64,memory:f64,storage:f64) -> Self {
        Self {cpu,memory,storage}
    }
    pub const fn uniform(amount:f64) -> Self {
        Self::new(amount,amount,amount)
    }
    pub fn as_array(&self) -> [f64;3] {
        [self.cpu,self.memory,self.storage]
    }
    pub fn total(&self) -> f64 {
        self.cpu + self.memory + self.storage
    }
    pub fn min_component(&self) -> f64 {
        self.cpu.min(self.memory).min(self.storage)
    }
    pub fn is_non_negative(&self) -> bool {
        self.min_component() >= -EPS
    }
    pub fn is_zero(&self) -> bool {
        self.as_array().iter().all(|v| v.abs() <= EPS)
    }
    // component-wise `self <= other`, with tolerance
    pub fn fits_in(&self,other:&Self) -> bool {
        self.as_array().iter().zip(other.as_array()).all(|(a,b)| *a <= b + EPS)
    }
    pub fn approx_eq(&self,other:&Self) -> bool {
        self.as_array().iter().zip(other.as_array()).all(|(a,b)| (a - b).abs() <= 1e-6)
    }
    pub fn min(&self,other:&Self) -> Self {
        Self::new(self.cpu.min(other.cpu),self.memory.min(other.memory),self.storage.min(other.storage))
    }
    pub fn clamp_non_negative(&self) -> Self {
        Self::new(self.cpu.max(0.0),self.memory.max(0.0),self.storage.max(0.0))
    }
}

impl Add for Resources {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.cpu + rhs.cpu,self.memory + rhs.memory,self.storage + rhs.storage)
    }
}

impl Sub for Resources {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.cpu - rhs.cpu,self.memory - rhs.memory,self.storage - rhs.storage)
    }
}

impl AddAssign for Resources {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Resources {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}
