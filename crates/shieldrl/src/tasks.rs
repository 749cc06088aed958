//! Strongly-typed task registry.
//!
//! Replaces the dict-of-literals style task table with validated structs:
//! every entry is checked at load time, so an unsupported constraint
//! combination aborts startup instead of surfacing mid-rollout.

use crate::{Result, ShieldError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Robot morphology used by a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RobotKind {
    Point,
    Swimmer,
    Ant,
}

/// Objective of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveKind {
    Goal,
}

/// The constraint family a task enforces, with its geometry.
///
/// The safety index needs a constraint radius; hazards use their size
/// directly, pillars get a fixed standoff added to account for the robot
/// body not being a point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ConstraintKind {
    Hazards { count: usize, size: f32 },
    Pillars { count: usize, size: f32 },
}

impl ConstraintKind {
    /// Radius used by the safety index for this constraint family.
    pub fn radius(&self) -> f32 {
        match *self {
            ConstraintKind::Hazards { size, .. } => size,
            ConstraintKind::Pillars { size, .. } => size + 0.1,
        }
    }

    pub fn count(&self) -> usize {
        match *self {
            ConstraintKind::Hazards { count, .. } | ConstraintKind::Pillars { count, .. } => count,
        }
    }
}

/// Raw, not-yet-validated task entry as it appears in the registry table.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawTaskEntry {
    pub robot: Option<RobotKind>,
    pub objective: Option<ObjectiveKind>,
    pub goal_size: f32,
    pub lidar_num_bins: usize,
    pub constrain_hazards: bool,
    pub hazards_num: usize,
    pub hazards_size: f32,
    pub constrain_pillars: bool,
    pub pillars_num: usize,
    pub pillars_size: f32,
    /// Dense cost when false, 0/1 indicator cost when true.
    pub constrain_indicator: bool,
    /// Symmetric control range applied to every action axis.
    pub ctrlrange: f32,
}

/// A validated task description.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub robot: RobotKind,
    pub objective: ObjectiveKind,
    pub goal_size: f32,
    pub lidar_num_bins: usize,
    pub constraint: ConstraintKind,
    pub indicator_cost: bool,
    pub ctrlrange: f32,
}

impl RawTaskEntry {
    /// Validate the entry into a [`TaskSpec`].
    ///
    /// A task with neither hazard- nor pillar-type constraints cannot define
    /// a safety index and is rejected outright.
    pub fn validate(&self, name: &str) -> Result<TaskSpec> {
        let robot = self
            .robot
            .ok_or_else(|| ShieldError::ConfigError(format!("task {name}: missing robot kind")))?;
        let objective = self.objective.ok_or_else(|| {
            ShieldError::ConfigError(format!("task {name}: missing objective kind"))
        })?;

        let constraint = match (self.constrain_hazards, self.constrain_pillars) {
            (true, false) => ConstraintKind::Hazards {
                count: self.hazards_num,
                size: self.hazards_size,
            },
            (false, true) => ConstraintKind::Pillars {
                count: self.pillars_num,
                size: self.pillars_size,
            },
            (true, true) => {
                return Err(ShieldError::ConfigError(format!(
                    "task {name}: hazards and pillars constraints are mutually exclusive"
                )))
            }
            (false, false) => {
                return Err(ShieldError::ConfigError(format!(
                    "task {name}: no supported constraint type configured \
                     (expected hazards or pillars)"
                )))
            }
        };

        if constraint.count() == 0 {
            return Err(ShieldError::ConfigError(format!(
                "task {name}: constraint object count must be positive"
            )));
        }
        if constraint.radius() <= 0.0 {
            return Err(ShieldError::ConfigError(format!(
                "task {name}: constraint radius must be positive"
            )));
        }
        if self.ctrlrange <= 0.0 {
            return Err(ShieldError::ConfigError(format!(
                "task {name}: ctrlrange must be positive"
            )));
        }

        Ok(TaskSpec {
            name: name.to_string(),
            robot,
            objective,
            goal_size: self.goal_size,
            lidar_num_bins: self.lidar_num_bins,
            constraint,
            indicator_cost: self.constrain_indicator,
            ctrlrange: self.ctrlrange,
        })
    }
}

/// Registry of known tasks, keyed by name.
pub struct TaskRegistry {
    entries: BTreeMap<String, RawTaskEntry>,
}

impl TaskRegistry {
    /// Look up and validate a task by name.
    pub fn lookup(&self, name: &str) -> Result<TaskSpec> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ShieldError::UnknownTask(name.to_string()))?;
        entry.validate(name)
    }

    /// Names of all registered tasks, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }
}

fn goal_hazards(robot: RobotKind, hazards_num: usize) -> RawTaskEntry {
    RawTaskEntry {
        robot: Some(robot),
        objective: Some(ObjectiveKind::Goal),
        goal_size: 0.5,
        lidar_num_bins: 16,
        constrain_hazards: true,
        hazards_num,
        hazards_size: 0.3,
        constrain_indicator: false,
        ctrlrange: 10.0,
        ..Default::default()
    }
}

fn goal_pillars(robot: RobotKind, pillars_num: usize) -> RawTaskEntry {
    RawTaskEntry {
        robot: Some(robot),
        objective: Some(ObjectiveKind::Goal),
        goal_size: 0.5,
        lidar_num_bins: 16,
        constrain_pillars: true,
        pillars_num,
        pillars_size: 0.2,
        constrain_indicator: false,
        ctrlrange: 10.0,
        ..Default::default()
    }
}

/// Build the built-in task table.
pub fn task_registry() -> TaskRegistry {
    let mut entries = BTreeMap::new();

    entries.insert(
        "Goal_Point_8Hazards".to_string(),
        goal_hazards(RobotKind::Point, 8),
    );
    entries.insert(
        "Goal_Point_4Pillars".to_string(),
        goal_pillars(RobotKind::Point, 4),
    );
    entries.insert(
        "Goal_Swimmer_8Hazards".to_string(),
        goal_hazards(RobotKind::Swimmer, 8),
    );
    entries.insert(
        "Goal_Ant_8Hazards".to_string(),
        goal_hazards(RobotKind::Ant, 8),
    );

    TaskRegistry { entries }
}
