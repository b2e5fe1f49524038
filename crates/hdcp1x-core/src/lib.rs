#![no_std]
#![forbid(unsafe_code)]
#[cfg(feature = "std")]
extern crate std;

/// Bit map of logical streams. Bit `n` selects stream `n`.
pub type StreamMap = u64;

/// Every stream the cipher can address.
pub const ALL_STREAMS: StreamMap = u64::MAX;

/// Key Selection Vector: the 40-bit public key identifier exchanged over the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ksv(u64);

impl Ksv {
    pub const SIZE: usize = 5;
    /// A well-formed KSV carries exactly this many ones (and as many zeros).
    pub const WEIGHT: u32 = 20;

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }

    pub fn from_le_bytes(buf: &[u8; Self::SIZE]) -> Self {
        Self(uint_from_le(buf))
    }

    pub fn to_le_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        uint_to_le(self.0, &mut buf);
        buf
    }

    pub fn is_valid(&self) -> bool {
        self.0.count_ones() == Self::WEIGHT
    }
}

impl core::fmt::Display for Ksv {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:010X}", self.0)
    }
}

/// Repeater topology word (HDMI Bstatus / DisplayPort Binfo).
///
/// Layout: bits 0-6 device count, bit 7 max-devices-exceeded,
/// bits 8-10 cascade depth, bit 11 max-cascade-exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RepeaterInfo(u16);

impl RepeaterInfo {
    pub const SIZE: usize = 2;

    const DEVICE_COUNT: u16 = 0x007F;
    const MAX_DEVS_EXCEEDED: u16 = 0x0080;
    const DEPTH: u16 = 0x0700;
    const MAX_CASCADE_EXCEEDED: u16 = 0x0800;
    const DEFINED: u16 = 0x0FFF;

    pub const fn new(raw: u16) -> Self {
        Self(raw & Self::DEFINED)
    }

    pub fn from_parts(device_count: u8, depth: u8) -> Self {
        let mut raw = (device_count as u16) & Self::DEVICE_COUNT;
        raw |= ((depth as u16) << 8) & Self::DEPTH;
        Self(raw)
    }

    pub fn with_max_devs_exceeded(self) -> Self {
        Self(self.0 | Self::MAX_DEVS_EXCEEDED)
    }

    pub fn with_max_cascade_exceeded(self) -> Self {
        Self(self.0 | Self::MAX_CASCADE_EXCEEDED)
    }

    pub const fn raw(&self) -> u16 {
        self.0
    }

    pub fn device_count(&self) -> usize {
        (self.0 & Self::DEVICE_COUNT) as usize
    }

    pub fn depth(&self) -> u8 {
        ((self.0 & Self::DEPTH) >> 8) as u8
    }

    pub fn max_devs_exceeded(&self) -> bool {
        self.0 & Self::MAX_DEVS_EXCEEDED != 0
    }

    pub fn max_cascade_exceeded(&self) -> bool {
        self.0 & Self::MAX_CASCADE_EXCEEDED != 0
    }

    pub fn to_le_bytes(&self) -> [u8; Self::SIZE] {
        self.0.to_le_bytes()
    }
}

/// The display link the protocol runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interface {
    Hdmi,
    DisplayPort,
}

impl Interface {
    pub fn registers(&self) -> &'static RegisterMap {
        match self {
            Interface::Hdmi => &RegisterMap::HDMI,
            Interface::DisplayPort => &RegisterMap::DISPLAYPORT,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Interface::Hdmi => "hdmi-tx",
            Interface::DisplayPort => "dp-tx",
        }
    }
}

/// Receiver-side register offsets.
/// All multi-byte registers are little-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterMap {
    pub bksv: u32,
    /// Ro' after authentication, Ri' afterwards.
    pub ri: u32,
    pub aksv: u32,
    pub ainfo: u32,
    pub an: u32,
    /// First of the V'H0..V'H4 words, each `SIZE_VH` bytes apart.
    pub v_h0: u32,
    pub ksv_fifo: u32,
    /// Largest single read the KSV FIFO accepts.
    pub ksv_fifo_window: usize,
}

impl RegisterMap {
    pub const SIZE_BKSV: usize = Ksv::SIZE;
    pub const SIZE_AKSV: usize = Ksv::SIZE;
    pub const SIZE_RI: usize = 2;
    pub const SIZE_AINFO: usize = 1;
    pub const SIZE_AN: usize = 8;
    pub const SIZE_VH: usize = 4;
    pub const NUM_VH: usize = 5;

    /// DDC (I2C 0x74) offsets.
    pub const HDMI: RegisterMap = RegisterMap {
        bksv: 0x00,
        ri: 0x08,
        aksv: 0x10,
        ainfo: 0x15,
        an: 0x18,
        v_h0: 0x20,
        ksv_fifo: 0x43,
        ksv_fifo_window: 15,
    };

    /// DPCD offsets.
    pub const DISPLAYPORT: RegisterMap = RegisterMap {
        bksv: 0x6_8000,
        ri: 0x6_8005,
        aksv: 0x6_8007,
        an: 0x6_800C,
        v_h0: 0x6_8014,
        ksv_fifo: 0x6_802C,
        ainfo: 0x6_803B,
        ksv_fifo_window: 15,
    };

    pub fn v_h(&self, index: usize) -> u32 {
        self.v_h0 + (index * Self::SIZE_VH) as u32
    }
}

/// Assembles an unsigned value from little-endian register bytes (at most 8).
pub fn uint_from_le(buf: &[u8]) -> u64 {
    buf.iter()
        .take(8)
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Spreads `value` over `buf` least-significant byte first.
pub fn uint_to_le(value: u64, buf: &mut [u8]) {
    for (i, b) in buf.iter_mut().take(8).enumerate() {
        *b = (value >> (8 * i)) as u8;
    }
}

pub type HdcpResult<T> = Result<T, HdcpError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HdcpError {
    Generic,
    InvalidParam,
    ReadFailure,
    WriteFailure,
    NotReady,
    CipherBusy,
    HalError,
}

impl core::fmt::Display for HdcpError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HdcpError {}
