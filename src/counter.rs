//! The one platform-specific piece of the engine: reading a free-running
//! hardware cycle counter. Everything above this module sees only
//! [`CycleCounter`].

/// A monotonic hardware tick source.
///
/// Implementations must be cheap, must not allocate, and must not branch:
/// `ticks` is called back-to-back inside the timed span of a sample block.
pub trait CycleCounter {
    fn ticks(&mut self) -> u64;
}

// ---------------------------------------------------------------------------
// x86_64: Time Stamp Counter
// ---------------------------------------------------------------------------

#[cfg(target_arch = "x86_64")]
mod x86 {
    use core::arch::asm;

    /// Reads the TSC with RDTSC. Deliberately not serialized (no LFENCE or
    /// RDTSCP) so each read costs the same few cycles.
    #[inline(always)]
    pub fn rdtsc() -> u64 {
        let lo: u32;
        let hi: u32;
        // SAFETY: RDTSC exists on every x86_64 CPU and only writes eax/edx.
        // The block is not `pure`, so the compiler keeps every read and
        // their relative order.
        unsafe {
            asm!(
                "rdtsc",
                out("eax") lo,
                out("edx") hi,
                options(nomem, nostack, preserves_flags),
            );
        }
        ((hi as u64) << 32) | lo as u64
    }
}

#[cfg(target_arch = "x86_64")]
#[derive(Debug, Default, Clone, Copy)]
pub struct Tsc;

#[cfg(target_arch = "x86_64")]
impl CycleCounter for Tsc {
    #[inline(always)]
    fn ticks(&mut self) -> u64 {
        x86::rdtsc()
    }
}

// ---------------------------------------------------------------------------
// aarch64: generic timer virtual count
// ---------------------------------------------------------------------------

#[cfg(target_arch = "aarch64")]
mod arm {
    use core::arch::asm;

    #[inline(always)]
    pub fn cntvct() -> u64 {
        let count: u64;
        // SAFETY: CNTVCT_EL0 is readable from EL0 on every supported OS.
        unsafe {
            asm!(
                "mrs {count}, cntvct_el0",
                count = out(reg) count,
                options(nomem, nostack, preserves_flags),
            );
        }
        count
    }
}

#[cfg(target_arch = "aarch64")]
#[derive(Debug, Default, Clone, Copy)]
pub struct VirtualCount;

#[cfg(target_arch = "aarch64")]
impl CycleCounter for VirtualCount {
    #[inline(always)]
    fn ticks(&mut self) -> u64 {
        arm::cntvct()
    }
}

// ---------------------------------------------------------------------------
// Everything else: CLOCK_MONOTONIC_RAW in nanoseconds
// ---------------------------------------------------------------------------

/// Nanosecond tick source for platforms without a user-readable cycle
/// counter. One tick is one nanosecond.
#[cfg_attr(any(target_arch = "x86_64", target_arch = "aarch64"), allow(dead_code))]
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl CycleCounter for MonotonicClock {
    #[inline(always)]
    fn ticks(&mut self) -> u64 {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        #[cfg(any(target_os = "linux", target_os = "android"))]
        let clock = libc::CLOCK_MONOTONIC_RAW;
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        let clock = libc::CLOCK_MONOTONIC;
        // SAFETY: `ts` is a valid, writable timespec for the duration of the call.
        unsafe {
            libc::clock_gettime(clock, &mut ts);
        }
        (ts.tv_sec as u64)
            .wrapping_mul(1_000_000_000)
            .wrapping_add(ts.tv_nsec as u64)
    }
}

#[cfg(target_arch = "x86_64")]
pub type NativeCounter = Tsc;
#[cfg(target_arch = "aarch64")]
pub type NativeCounter = VirtualCount;
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub type NativeCounter = MonotonicClock;

/// Human-readable name of [`NativeCounter`] for log output.
pub const NATIVE_COUNTER_NAME: &str = if cfg!(target_arch = "x86_64") {
    "TSC (rdtsc)"
} else if cfg!(target_arch = "aarch64") {
    "CNTVCT_EL0"
} else {
    "CLOCK_MONOTONIC_RAW"
};

pub fn native() -> NativeCounter {
    NativeCounter::default()
}

/// Replays a fixed step pattern, for exercising the sampler without hardware.
#[cfg(test)]
#[derive(Debug, Clone)]
pub(crate) struct ScriptedCounter {
    now: u64,
    steps: Vec<i64>,
    pos: usize,
}

#[cfg(test)]
impl ScriptedCounter {
    /// `steps` is cycled forever; a negative step moves the counter backwards.
    pub(crate) fn new(start: u64, steps: &[i64]) -> Self {
        assert!(!steps.is_empty());
        Self {
            now: start,
            steps: steps.to_vec(),
            pos: 0,
        }
    }
}

#[cfg(test)]
impl CycleCounter for ScriptedCounter {
    fn ticks(&mut self) -> u64 {
        let value = self.now;
        self.now = self
            .now
            .wrapping_add_signed(self.steps[self.pos % self.steps.len()]);
        self.pos += 1;
        value
    }
}
