#![allow(non_snake_case)]
use tock_registers::{
    register_bitfields,
    registers::{ReadOnly, ReadWrite, WriteOnly},
};

#[repr(C)]
pub struct GpTimer {
    pub TIDR: ReadOnly<u32>,
    _reserved1: [u32; 3],
    pub TIOCP_CFG: ReadWrite<u32>,
    pub TISTAT: ReadOnly<u32>,
    /// Write `1` to clear.
    pub TISR: ReadWrite<u32, Irq::Register>,
    pub TIER: ReadWrite<u32, Irq::Register>,
    pub TWER: ReadWrite<u32, Irq::Register>,
    pub TCLR: ReadWrite<u32, Tclr::Register>,
    pub TCRR: ReadWrite<u32>,
    pub TLDR: ReadWrite<u32>,
    pub TTGR: WriteOnly<u32>,
    pub TWPS: ReadOnly<u32>,
    pub TMAR: ReadWrite<u32>,
}

register_bitfields! {u32,
    pub Tclr [
        /// Start/stop the timer
        ST OFFSET(0) NUMBITS(1) [
            Stop = 0,
            Start = 1
        ],

        /// Auto-reload mode
        AR OFFSET(1) NUMBITS(1) [
            OneShot = 0,
            AutoReload = 1
        ],

        /// Prescale clock timer value
        PTV OFFSET(2) NUMBITS(3) [],

        /// Prescaler enable
        PRE OFFSET(5) NUMBITS(1) [
            Disable = 0,
            Enable = 1
        ],

        /// Compare enable
        CE OFFSET(6) NUMBITS(1) [
            Disable = 0,
            Enable = 1
        ]
    ],

    pub Irq [
        /// Match
        MAT OFFSET(0) NUMBITS(1) [],

        /// Overflow
        OVF OFFSET(1) NUMBITS(1) [],

        /// Capture
        TCAR OFFSET(2) NUMBITS(1) []
    ]
}
