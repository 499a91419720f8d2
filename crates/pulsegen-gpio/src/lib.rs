//! GPIO output plane for the pulse generator.
//!
//! This crate provides:
//! - [`GpioOutput`] trait abstracting a single digital output line
//! - [`bcm`] module with the memory-mapped BCM283x register driver
//! - [`SimulatedGpio`] in-memory double for tests
//!
//! The pin-to-register arithmetic lives entirely behind the trait; the
//! driver core only ever calls `set`/`clear`.

#[cfg(target_os = "linux")]
pub mod bcm;

#[cfg(target_os = "linux")]
pub use bcm::Bcm2835Gpio;

use pulsegen_common::PulseResult;

/// Digital output line abstraction.
///
/// Implementations map a pin number to whatever register or in-memory
/// representation backs it. `set`/`clear` are infallible: a volatile
/// register write has no failure mode once the window is mapped.
pub trait GpioOutput: Send {
    /// Configure the pin as an output. Must be called before `set`/`clear`.
    fn configure_as_output(&mut self, pin: u32) -> PulseResult<()>;

    /// Drive the pin high.
    fn set(&mut self, pin: u32);

    /// Drive the pin low.
    fn clear(&mut self, pin: u32);
}

impl<T: GpioOutput + ?Sized> GpioOutput for Box<T> {
    fn configure_as_output(&mut self, pin: u32) -> PulseResult<()> {
        (**self).configure_as_output(pin)
    }

    fn set(&mut self, pin: u32) {
        (**self).set(pin);
    }

    fn clear(&mut self, pin: u32) {
        (**self).clear(pin);
    }
}

/// Simulated GPIO output for testing.
///
/// Records every edge so tests can verify strict alternation and edge
/// counts without hardware.
#[derive(Debug, Default)]
pub struct SimulatedGpio {
    configured: Vec<u32>,
    edges: Vec<(u32, bool)>,
}

impl SimulatedGpio {
    /// Create a new simulated output.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins configured as outputs so far.
    #[must_use]
    pub fn configured_pins(&self) -> &[u32] {
        &self.configured
    }

    /// Every recorded edge, in order: `(pin, level)`.
    #[must_use]
    pub fn edges(&self) -> &[(u32, bool)] {
        &self.edges
    }

    /// Last driven level of a pin, if it was ever written.
    #[must_use]
    pub fn level(&self, pin: u32) -> Option<bool> {
        self.edges
            .iter()
            .rev()
            .find(|(p, _)| *p == pin)
            .map(|(_, level)| *level)
    }
}

impl GpioOutput for SimulatedGpio {
    fn configure_as_output(&mut self, pin: u32) -> PulseResult<()> {
        self.configured.push(pin);
        Ok(())
    }

    fn set(&mut self, pin: u32) {
        self.edges.push((pin, true));
    }

    fn clear(&mut self, pin: u32) {
        self.edges.push((pin, false));
    }
}
