use crate::error::DriverError;
use crate::host::{
    ComponentHandle, ControllerRole, DriverInput, PropertyContainerHandle, ScalarType, ScalarUnits,
};
use std::fmt;
use tracing::debug;

// Input and output components exposed by one controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputComponent {
    ATouch,
    AClick,
    TriggerValue,
    TriggerClick,
    Haptic,
}

impl InputComponent {
    pub const ALL: [InputComponent; 5] = [
        InputComponent::ATouch,
        InputComponent::AClick,
        InputComponent::TriggerValue,
        InputComponent::TriggerClick,
        InputComponent::Haptic,
    ];

    /// Path of the component as declared in the input profile.
    pub fn path(self) -> &'static str {
        match self {
            InputComponent::ATouch => "/input/a/touch",
            InputComponent::AClick => "/input/a/click",
            InputComponent::TriggerValue => "/input/trigger/value",
            InputComponent::TriggerClick => "/input/trigger/click",
            InputComponent::Haptic => "/output/haptic",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for InputComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Host handles for every component of a controller.
///
/// Handles stay tied to the container they were created in. The host keeps
/// a component once created, so a retried creation must only fill the gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputHandles {
    container: PropertyContainerHandle,
    handles: [ComponentHandle; 5],
}

impl Default for InputHandles {
    fn default() -> Self {
        Self {
            container: PropertyContainerHandle::INVALID,
            handles: [ComponentHandle::INVALID; 5],
        }
    }
}

impl InputHandles {
    /// Creates every component not yet created in `container`. The first
    /// failure aborts; handles created so far are kept for the next call.
    pub fn create_missing(
        &mut self,
        input: &dyn DriverInput,
        container: PropertyContainerHandle,
        role: ControllerRole,
    ) -> Result<(), DriverError> {
        if self.container != container {
            *self = Self {
                container,
                ..Self::default()
            };
        }

        for component in InputComponent::ALL {
            if self.get(component) != ComponentHandle::INVALID {
                continue;
            }

            let created = match component {
                InputComponent::ATouch | InputComponent::AClick | InputComponent::TriggerClick => {
                    input.create_boolean_component(container, component.path())
                }
                // Absolute position, 0..1 since the trigger has one side
                InputComponent::TriggerValue => input.create_scalar_component(
                    container,
                    component.path(),
                    ScalarType::Absolute,
                    ScalarUnits::NormalizedOneSided,
                ),
                InputComponent::Haptic => input.create_haptic_component(container, component.path()),
            };

            let handle = created.map_err(|source| DriverError::ComponentError {
                role,
                component,
                source,
            })?;
            debug!("{} controller: created {} as {}", role, component, handle);
            self.handles[component.slot()] = handle;
        }

        Ok(())
    }

    pub fn get(&self, component: InputComponent) -> ComponentHandle {
        self.handles[component.slot()]
    }

    /// Pushes the resting state of every input. Real hardware would be
    /// sampled here.
    pub fn push_idle_state(&self, input: &dyn DriverInput) {
        let updates = [
            input.update_boolean_component(self.get(InputComponent::AClick), false, 0.0),
            input.update_boolean_component(self.get(InputComponent::ATouch), false, 0.0),
            input.update_boolean_component(self.get(InputComponent::TriggerClick), false, 0.0),
            input.update_scalar_component(self.get(InputComponent::TriggerValue), 0.0, 0.0),
        ];

        for result in updates {
            if let Err(e) = result {
                debug!("Dropping failed input update: {}", e);
            }
        }
    }
}
