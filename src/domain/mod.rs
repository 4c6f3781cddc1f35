// Domain layer: job inputs, model types and the ports the worker depends on.

pub mod input;
pub mod model;
pub mod ports;
