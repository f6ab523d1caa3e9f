use std::fmt;

/// Number of data registers (`D0..D7`).
pub const DATA_REGISTER_COUNT: usize = 8;
/// Number of address registers (`A0..A7`).
pub const ADDRESS_REGISTER_COUNT: usize = 8;
/// Number of general registers captured in a context (`D0..D7`, `A0..A7`).
pub const REGISTER_COUNT: usize = DATA_REGISTER_COUNT + ADDRESS_REGISTER_COUNT;
/// Status register value after reset: supervisor mode, interrupts masked.
pub const SR_RESET: u16 = 0x2700;
/// `SR` bit selecting supervisor mode.
pub const SR_SUPERVISOR: u16 = 1 << 13;

/// Flag letters of the status register, most significant bit first.
const SR_FLAGS: &[u8; 16] = b"T?S??210???XNZVC";

/// General register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Register {
    D0 = 0,
    D1 = 1,
    D2 = 2,
    D3 = 3,
    D4 = 4,
    D5 = 5,
    D6 = 6,
    D7 = 7,
    A0 = 8,
    A1 = 9,
    A2 = 10,
    A3 = 11,
    A4 = 12,
    A5 = 13,
    A6 = 14,
    A7 = 15,
}

impl Register {
    /// All general registers, data registers first.
    pub const ALL: [Self; REGISTER_COUNT] = [
        Self::D0,
        Self::D1,
        Self::D2,
        Self::D3,
        Self::D4,
        Self::D5,
        Self::D6,
        Self::D7,
        Self::A0,
        Self::A1,
        Self::A2,
        Self::A3,
        Self::A4,
        Self::A5,
        Self::A6,
        Self::A7,
    ];

    /// Returns the array index for this register (`0..=15`).
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (bank, number) = match self.index() {
            i if i < DATA_REGISTER_COUNT => ('D', i),
            i => ('A', i - DATA_REGISTER_COUNT),
        };
        write!(f, "{bank}{number}")
    }
}

/// Complete register context of the engine, saved and restored around nested runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CpuContext {
    regs: [u32; REGISTER_COUNT],
    pc: u32,
    sr: u16,
    usp: u32,
    isp: u32,
    msp: u32,
    vbr: u32,
}

impl Default for CpuContext {
    fn default() -> Self {
        Self {
            regs: [0; REGISTER_COUNT],
            pc: 0,
            sr: SR_RESET,
            usp: 0,
            isp: 0,
            msp: 0,
            vbr: 0,
        }
    }
}

impl CpuContext {
    /// Reads a general register.
    #[must_use]
    pub const fn reg(&self, reg: Register) -> u32 {
        self.regs[reg.index()]
    }

    /// Writes a general register.
    pub const fn set_reg(&mut self, reg: Register, value: u32) {
        self.regs[reg.index()] = value;
    }

    /// Reads the program counter.
    #[must_use]
    pub const fn pc(&self) -> u32 {
        self.pc
    }

    /// Writes the program counter.
    pub const fn set_pc(&mut self, value: u32) {
        self.pc = value;
    }

    /// Reads the active stack pointer (`A7`).
    #[must_use]
    pub const fn sp(&self) -> u32 {
        self.regs[Register::A7.index()]
    }

    /// Writes the active stack pointer (`A7`).
    pub const fn set_sp(&mut self, value: u32) {
        self.regs[Register::A7.index()] = value;
    }

    /// Reads the status register.
    #[must_use]
    pub const fn sr(&self) -> u16 {
        self.sr
    }

    /// Writes the status register.
    pub const fn set_sr(&mut self, value: u16) {
        self.sr = value;
    }

    /// Returns `true` in supervisor mode.
    #[must_use]
    pub const fn is_supervisor(&self) -> bool {
        self.sr & SR_SUPERVISOR != 0
    }

    /// Reads the user stack pointer.
    #[must_use]
    pub const fn usp(&self) -> u32 {
        self.usp
    }

    /// Writes the user stack pointer.
    pub const fn set_usp(&mut self, value: u32) {
        self.usp = value;
    }

    /// Reads the interrupt stack pointer.
    #[must_use]
    pub const fn isp(&self) -> u32 {
        self.isp
    }

    /// Writes the interrupt stack pointer.
    pub const fn set_isp(&mut self, value: u32) {
        self.isp = value;
    }

    /// Reads the master stack pointer.
    #[must_use]
    pub const fn msp(&self) -> u32 {
        self.msp
    }

    /// Writes the master stack pointer.
    pub const fn set_msp(&mut self, value: u32) {
        self.msp = value;
    }

    /// Reads the vector base register.
    #[must_use]
    pub const fn vbr(&self) -> u32 {
        self.vbr
    }

    /// Writes the vector base register.
    pub const fn set_vbr(&mut self, value: u32) {
        self.vbr = value;
    }

    /// Renders the status register as flag letters, `-` for clear bits.
    #[must_use]
    pub fn sr_flags(&self) -> String {
        SR_FLAGS
            .iter()
            .enumerate()
            .map(|(i, &flag)| {
                if self.sr & (0x8000 >> i) != 0 {
                    char::from(flag)
                } else {
                    '-'
                }
            })
            .collect()
    }

    /// Formats the register dump: PC and SR, two lines each of data and
    /// address registers, then the control registers.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        let bank = |regs: &[Register]| {
            regs.iter()
                .map(|&reg| format!(" {reg}={:08x}", self.reg(reg)))
                .collect::<Vec<_>>()
                .join(" ")
        };
        let (data, address) = Register::ALL.split_at(DATA_REGISTER_COUNT);
        vec![
            format!(" PC={:08x}  SR={}", self.pc, self.sr_flags()),
            bank(&data[..4]),
            bank(&data[4..]),
            bank(&address[..4]),
            bank(&address[4..]),
            format!(
                "USP={:08x} ISP={:08x} MSP={:08x} VBR={:08x}",
                self.usp, self.isp, self.msp, self.vbr
            ),
        ]
    }
}

impl fmt::Display for CpuContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines().join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::{CpuContext, Register, REGISTER_COUNT, SR_RESET};

    #[test]
    fn register_names_follow_their_bank() {
        let names: Vec<String> = Register::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(names[0], "D0");
        assert_eq!(names[7], "D7");
        assert_eq!(names[8], "A0");
        assert_eq!(names[15], "A7");
    }

    #[test]
    fn register_dump_renders_every_register() {
        let mut ctx = CpuContext::default();
        for (offset, reg) in (0_u32..).zip(Register::ALL) {
            ctx.set_reg(reg, 0x1111_0000 + offset);
        }
        ctx.set_pc(0x0000_1004);
        ctx.set_sr(0x2704);
        ctx.set_usp(0x10);
        ctx.set_isp(0x20);
        ctx.set_msp(0x30);
        ctx.set_vbr(0x40);

        assert_eq!(ctx.sr_flags(), "--S--210-----Z--");
        assert_eq!(
            ctx.to_string(),
            [
                " PC=00001004  SR=--S--210-----Z--",
                " D0=11110000  D1=11110001  D2=11110002  D3=11110003",
                " D4=11110004  D5=11110005  D6=11110006  D7=11110007",
                " A0=11110008  A1=11110009  A2=1111000a  A3=1111000b",
                " A4=1111000c  A5=1111000d  A6=1111000e  A7=1111000f",
                "USP=00000010 ISP=00000020 MSP=00000030 VBR=00000040",
            ]
            .join("\n")
        );
    }

    #[test]
    fn register_file_tracks_each_register_independently() {
        let mut ctx = CpuContext::default();
        for (offset, reg) in (0_u32..).zip(Register::ALL) {
            ctx.set_reg(reg, 0x1000 + offset);
        }
        for (offset, reg) in (0_u32..).zip(Register::ALL) {
            assert_eq!(ctx.reg(reg), 0x1000 + offset);
        }
        assert_eq!(Register::ALL.len(), REGISTER_COUNT);
    }

    #[test]
    fn stack_pointer_aliases_a7() {
        let mut ctx = CpuContext::default();
        ctx.set_sp(0x8000);
        assert_eq!(ctx.reg(Register::A7), 0x8000);
        ctx.set_reg(Register::A7, 0x7FFC);
        assert_eq!(ctx.sp(), 0x7FFC);
    }

    #[test]
    fn reset_context_is_supervisor_with_interrupts_masked() {
        let ctx = CpuContext::default();
        assert_eq!(ctx.sr(), SR_RESET);
        assert!(ctx.is_supervisor());
    }

    #[test]
    fn control_registers_are_stored() {
        let mut ctx = CpuContext::default();
        ctx.set_pc(0x1000);
        ctx.set_usp(1);
        ctx.set_isp(2);
        ctx.set_msp(3);
        ctx.set_vbr(4);
        ctx.set_sr(0);
        assert_eq!(
            (ctx.pc(), ctx.usp(), ctx.isp(), ctx.msp(), ctx.vbr()),
            (0x1000, 1, 2, 3, 4)
        );
        assert!(!ctx.is_supervisor());
    }
}
