//! Memory-mapped GPIO driver for BCM283x (Raspberry Pi class) SoCs.
//!
//! Maps one page of the GPIO peripheral through `/dev/mem` and drives pins
//! via the function-select and set/clear register banks. Mapping failure is
//! a fatal setup error; once mapped, writes cannot fail.

use crate::GpioOutput;
use pulsegen_common::{PulseError, PulseResult};
use tracing::{debug, info};

/// BCM2710 peripheral base (Raspberry Pi 2/3).
const PERI_BASE: libc::off_t = 0x3F00_0000;
/// GPIO controller offset within the peripheral window.
const GPIO_BASE: libc::off_t = PERI_BASE + 0x0020_0000;
/// Length of the mapped register window.
const MAP_LEN: usize = 4096;

/// Highest valid GPIO number on BCM283x.
const MAX_PIN: u32 = 53;

// Word offsets within the GPIO register bank.
const GPSET0: usize = 7;
const GPSET1: usize = 8;
const GPCLR0: usize = 10;
const GPCLR1: usize = 11;

/// GPIO output backed by the memory-mapped BCM283x register bank.
#[derive(Debug)]
pub struct Bcm2835Gpio {
    base: *mut u32,
}

// The mapping is exclusively owned by this handle and only touched through
// volatile accesses, so moving it across threads is sound.
unsafe impl Send for Bcm2835Gpio {}

impl Bcm2835Gpio {
    /// Map the GPIO register window through `/dev/mem`.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Gpio`] if `/dev/mem` cannot be opened (usually
    /// a privilege problem) or the mapping fails.
    pub fn open() -> PulseResult<Self> {
        // SAFETY: plain open(2) on a constant path.
        let fd = unsafe {
            libc::open(
                b"/dev/mem\0".as_ptr().cast(),
                libc::O_RDWR | libc::O_SYNC,
            )
        };
        if fd < 0 {
            let err = std::io::Error::last_os_error();
            return Err(PulseError::Gpio(format!("cannot open /dev/mem: {err}")));
        }

        // SAFETY: maps a fixed-size window at the GPIO peripheral offset;
        // fd is valid and closed right after (the mapping survives it).
        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                MAP_LEN,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                GPIO_BASE,
            )
        };
        // SAFETY: fd came from open above.
        unsafe {
            libc::close(fd);
        }

        if base == libc::MAP_FAILED {
            let err = std::io::Error::last_os_error();
            return Err(PulseError::Gpio(format!(
                "cannot map GPIO registers at {GPIO_BASE:#x}: {err}"
            )));
        }

        info!(base = ?base, "GPIO register window mapped");
        Ok(Self { base: base.cast() })
    }

    fn read_reg(&self, index: usize) -> u32 {
        debug_assert!(index * 4 < MAP_LEN);
        // SAFETY: index is within the mapped window.
        unsafe { std::ptr::read_volatile(self.base.add(index)) }
    }

    fn write_reg(&mut self, index: usize, value: u32) {
        debug_assert!(index * 4 < MAP_LEN);
        // SAFETY: index is within the mapped window.
        unsafe {
            std::ptr::write_volatile(self.base.add(index), value);
        }
    }
}

impl GpioOutput for Bcm2835Gpio {
    fn configure_as_output(&mut self, pin: u32) -> PulseResult<()> {
        if pin > MAX_PIN {
            return Err(PulseError::Gpio(format!(
                "GPIO {pin} out of range (0-{MAX_PIN})"
            )));
        }

        // Function select: 3 bits per pin, 10 pins per GPFSEL register.
        // Clear the field to input first, then select output (0b001).
        let fsel = (pin / 10) as usize;
        let shift = (pin % 10) * 3;

        let mut value = self.read_reg(fsel);
        value &= !(0b111 << shift);
        self.write_reg(fsel, value);
        value |= 0b001 << shift;
        self.write_reg(fsel, value);

        debug!(pin, fsel, "GPIO configured as output");
        Ok(())
    }

    fn set(&mut self, pin: u32) {
        if pin >= 32 {
            self.write_reg(GPSET1, 1 << (pin % 32));
        } else {
            self.write_reg(GPSET0, 1 << pin);
        }
    }

    fn clear(&mut self, pin: u32) {
        if pin >= 32 {
            self.write_reg(GPCLR1, 1 << (pin % 32));
        } else {
            self.write_reg(GPCLR0, 1 << pin);
        }
    }
}

impl Drop for Bcm2835Gpio {
    fn drop(&mut self) {
        // SAFETY: base came from a successful mmap of MAP_LEN bytes.
        unsafe {
            libc::munmap(self.base.cast(), MAP_LEN);
        }
    }
}
