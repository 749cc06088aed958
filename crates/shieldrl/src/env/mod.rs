//! Environment boundary.
//!
//! The physics simulator is an external collaborator; this module defines the
//! trait it must satisfy and the fault-recovery combinators the trainer uses
//! at that boundary.

mod traits;

pub use traits::{
    fault_tolerant_step, retry_reset, HazardReadings, SafeEnv, SimFault, StepInfo, Transition,
};
