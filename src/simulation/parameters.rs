/*!
Tunable parameters of solver components.

Components expose their tunables by handing typed references to a [`ParameterVisitor`]. The visitor decides
what to do with them: [`ParameterTable`] takes a snapshot for listing, [`ParameterAssignments`] writes new
values while enforcing minimum values and read-only flags.
*/

use std::{collections::HashMap, fmt};

use crate::{
    error::{ConfigError, ConfigResult, ParameterError},
    floating_type_mod::FT,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterInfo {
    pub name: &'static str,
    pub label: &'static str,
    pub group: &'static str,
    pub description: &'static str,
    pub read_only: bool,
}

pub enum ParameterValue<'a> {
    Real { value: &'a mut FT, min: Option<FT> },
    UInt { value: &'a mut usize, min: Option<usize> },
}

pub trait ParameterVisitor {
    fn visit(&mut self, info: ParameterInfo, value: ParameterValue<'_>);
}

pub trait Parameterized {
    fn register_parameters(&mut self, visitor: &mut dyn ParameterVisitor);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterSnapshot {
    Real { value: FT, min: Option<FT> },
    UInt { value: usize, min: Option<usize> },
}

impl fmt::Display for ParameterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterSnapshot::Real { value, min } => {
                write!(f, "{}", value)?;
                if let Some(min) = min {
                    write!(f, " (min {})", min)?;
                }
                Ok(())
            }
            ParameterSnapshot::UInt { value, min } => {
                write!(f, "{}", value)?;
                if let Some(min) = min {
                    write!(f, " (min {})", min)?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterEntry {
    pub info: ParameterInfo,
    pub value: ParameterSnapshot,
}

#[derive(Debug, Default)]
pub struct ParameterTable {
    entries: Vec<ParameterEntry>,
}

impl ParameterTable {
    pub fn collect(target: &mut dyn Parameterized) -> ParameterTable {
        let mut table = ParameterTable::default();
        target.register_parameters(&mut table);
        table
    }

    pub fn entries(&self) -> &[ParameterEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&ParameterEntry> {
        self.entries.iter().find(|e| e.info.name == name)
    }
}

impl ParameterVisitor for ParameterTable {
    fn visit(&mut self, info: ParameterInfo, value: ParameterValue<'_>) {
        let value = match value {
            ParameterValue::Real { value, min } => ParameterSnapshot::Real { value: *value, min },
            ParameterValue::UInt { value, min } => ParameterSnapshot::UInt { value: *value, min },
        };
        self.entries.push(ParameterEntry { info, value });
    }
}

impl fmt::Display for ParameterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut current_group = "";
        for entry in &self.entries {
            if entry.info.group != current_group {
                current_group = entry.info.group;
                writeln!(f, "[{}]", current_group)?;
            }
            writeln!(
                f,
                "  {:<20} {:<28} = {}{}",
                entry.info.name,
                entry.info.label,
                entry.value,
                if entry.info.read_only { " [read-only]" } else { "" }
            )?;
            writeln!(f, "  {:<20} {}", "", entry.info.description)?;
        }
        Ok(())
    }
}

/**
 * A set of "name = value" assignments to registered parameters.
 */
#[derive(Debug, Default)]
pub struct ParameterAssignments {
    values: HashMap<String, serde_yaml::Value>,
    errors: Vec<ParameterError>,
}

impl ParameterAssignments {
    pub fn new(values: HashMap<String, serde_yaml::Value>) -> ParameterAssignments {
        ParameterAssignments {
            values,
            errors: Vec::new(),
        }
    }

    /**
     * Parses assignments of the form `NAME=VALUE`, the value is parsed as YAML scalar.
     */
    pub fn parse<'a>(assignments: impl IntoIterator<Item = &'a str>) -> ConfigResult<ParameterAssignments> {
        let mut values = HashMap::new();
        for assignment in assignments {
            let (name, value) = assignment
                .split_once('=')
                .ok_or_else(|| ConfigError::MalformedAssignment(assignment.to_string()))?;
            let value: serde_yaml::Value = serde_yaml::from_str(value.trim())?;
            values.insert(name.trim().to_string(), value);
        }
        Ok(ParameterAssignments::new(values))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /**
     * Writes all assignments into `target`. Assignments that are rejected leave the parameter unchanged;
     * the first rejection is returned.
     */
    pub fn apply(mut self, target: &mut dyn Parameterized) -> Result<(), ParameterError> {
        target.register_parameters(&mut self);

        let mut unknown: Vec<String> = self.values.into_keys().collect();
        unknown.sort();
        self.errors
            .extend(unknown.into_iter().map(|name| ParameterError::Unknown { name }));

        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn assign(info: &ParameterInfo, new_value: &serde_yaml::Value, value: ParameterValue<'_>) -> Result<(), ParameterError> {
        if info.read_only {
            return Err(ParameterError::ReadOnly {
                name: info.name.to_string(),
            });
        }

        let wrong_type = |expected: &'static str| ParameterError::WrongType {
            name: info.name.to_string(),
            expected,
            value: format!("{:?}", new_value),
        };

        match value {
            ParameterValue::Real { value, min } => {
                let x = new_value.as_f64().ok_or_else(|| wrong_type("a real number"))? as FT;
                if let Some(min) = min {
                    if !(x >= min) {
                        return Err(ParameterError::BelowMinimum {
                            name: info.name.to_string(),
                            value: x,
                            min,
                        });
                    }
                }
                *value = x;
            }
            ParameterValue::UInt { value, min } => {
                let x = new_value.as_u64().ok_or_else(|| wrong_type("a non-negative integer"))? as usize;
                if let Some(min) = min {
                    if x < min {
                        return Err(ParameterError::BelowMinimum {
                            name: info.name.to_string(),
                            value: x as FT,
                            min: min as FT,
                        });
                    }
                }
                *value = x;
            }
        }
        Ok(())
    }
}

impl ParameterVisitor for ParameterAssignments {
    fn visit(&mut self, info: ParameterInfo, value: ParameterValue<'_>) {
        if let Some(new_value) = self.values.remove(info.name) {
            if let Err(err) = Self::assign(&info, &new_value, value) {
                self.errors.push(err);
            }
        }
    }
}
