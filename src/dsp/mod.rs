//! DSP primitives for the routing graph.
//!
//! These are the raw processing stages the graph wires together: biquad
//! filter nodes, the feedback delay line, and the convolution engine behind
//! the reverb bus. None of them know about stems or mix policy.

mod biquad;
mod convolver;
mod delay;

pub use biquad::{Biquad, FilterKind};
pub use convolver::Convolver;
pub use delay::FeedbackDelay;
