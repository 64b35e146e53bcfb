use crate::{
    floating_type_mod::FT,
    parameters::{ParameterInfo, ParameterValue, ParameterVisitor, Parameterized},
    FluidModel, TimeManager,
};

pub mod weiler2018;

/**
 * A force that is not caused by pressure (viscosity, drag, surface tension, ...). It is evaluated once per
 * time step after the neighborhood search and adds its contribution to the model accelerations.
 */
pub trait NonPressureForce<M: FluidModel + ?Sized>: Parameterized {
    fn step(&mut self, model: &mut M, time: &TimeManager);

    fn reset(&mut self) {}

    /// Called when the particles were reordered for cache locality.
    fn perform_neighborhood_search_sort(&mut self) {}
}

pub const DEFAULT_VISCOSITY: FT = 0.01;

/**
 * State shared by all viscosity methods.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViscosityBase {
    pub viscosity: FT,
}

impl Default for ViscosityBase {
    fn default() -> Self {
        ViscosityBase {
            viscosity: DEFAULT_VISCOSITY,
        }
    }
}

impl Parameterized for ViscosityBase {
    fn register_parameters(&mut self, visitor: &mut dyn ParameterVisitor) {
        visitor.visit(
            ParameterInfo {
                name: "viscosity",
                label: "Viscosity coefficient",
                group: "Viscosity",
                description: "Coefficient for the viscosity force computation.",
                read_only: false,
            },
            ParameterValue::Real {
                value: &mut self.viscosity,
                min: Some(0.),
            },
        );
    }
}
