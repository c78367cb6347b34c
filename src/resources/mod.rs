// src/resources/mod.rs

//! Global concurrency limits: process slots and thread slots.

pub mod pool;

pub use pool::{CapacityError, PoolCapacity, Reservation, ResourcePool, SlotLease};
