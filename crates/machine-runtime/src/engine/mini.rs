use std::collections::VecDeque;

use crate::engine::timing::{cycle_cost, CycleCostKind};
use crate::engine::{
    AccessWidth, Engine, HookResult, MemAccess, MemFlags, RegionBinding, TraceHook, TraceHookKind,
};
use crate::memory::{page_of, SpecialHandlers, PAGE_BYTES, PAGE_MASK};
use crate::state::SR_RESET;
use crate::{
    CallbackError, CpuContext, CpuType, EngineError, EventData, EventKind, EventRecord, Register,
};

/// `RESET`
pub const OP_RESET: u16 = 0x4E70;
/// `NOP`
pub const OP_NOP: u16 = 0x4E71;
/// `RTS`
pub const OP_RTS: u16 = 0x4E75;
/// `MOVE.L #imm,D0`
pub const OP_MOVE_IMM_D0: u16 = 0x203C;
/// `MOVE.L abs.l,D0`
pub const OP_MOVE_ABS_D0: u16 = 0x2039;
/// `MOVE.L D0,abs.l`
pub const OP_MOVE_D0_ABS: u16 = 0x23C0;

const PAGE_LEN: usize = PAGE_BYTES as usize;

type InstrHook = Box<dyn FnMut(u32, u16) -> HookResult>;
type CpuMemHook = Box<dyn FnMut(&MemAccess) -> HookResult>;
type ApiMemHook = Box<dyn FnMut(&MemAccess) -> Result<(), CallbackError>>;

#[derive(Debug, Clone)]
enum PageSlot {
    Unmapped,
    Memory { frame: usize, flags: MemFlags },
    Special(SpecialHandlers),
    Empty(u32),
}

/// Outcome of a CPU-side access; faults have already been queued as events.
enum Bus<T> {
    Ok(T),
    Fault,
}

/// Deterministic reference engine executing a handful of 68000 opcodes.
///
/// Memory lives in 64 KiB frames; mirrored pages share a frame. Anything the
/// host should look at (resets, traps, bad accesses, failing callbacks, hook
/// output) is queued as an [`EventRecord`] and ends the current batch after
/// the instruction that raised it.
#[derive(Default)]
pub struct MiniEngine {
    cpu_type: Option<CpuType>,
    num_pages: u32,
    labels_enabled: bool,
    slots: Vec<PageSlot>,
    frames: Vec<Box<[u8]>>,
    ctx: CpuContext,
    done_cycles: u64,
    total_cycles: u64,
    pending: Vec<EventRecord>,
    instr_hook: Option<InstrHook>,
    cpu_mem_hook: Option<CpuMemHook>,
    api_mem_hook: Option<ApiMemHook>,
    pc_trace: VecDeque<u32>,
    pc_trace_depth: usize,
}

impl std::fmt::Debug for MiniEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiniEngine")
            .field("cpu_type", &self.cpu_type)
            .field("num_pages", &self.num_pages)
            .field("frames", &self.frames.len())
            .field("ctx", &self.ctx)
            .field("total_cycles", &self.total_cycles)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl MiniEngine {
    /// Creates an uninitialized engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the CPU model, `None` before `init`.
    #[must_use]
    pub const fn cpu_type(&self) -> Option<CpuType> {
        self.cpu_type
    }

    /// Returns the page count given to `init`.
    #[must_use]
    pub const fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// Returns whether labels were enabled on `init`.
    #[must_use]
    pub const fn labels_enabled(&self) -> bool {
        self.labels_enabled
    }

    /// Returns `true` when a trace hook of `kind` is installed.
    #[must_use]
    pub const fn has_trace_hook(&self, kind: TraceHookKind) -> bool {
        match kind {
            TraceHookKind::Instruction => self.instr_hook.is_some(),
            TraceHookKind::CpuMemory => self.cpu_mem_hook.is_some(),
            TraceHookKind::ApiMemory => self.api_mem_hook.is_some(),
        }
    }

    const fn ensure_init(&self) -> Result<CpuType, EngineError> {
        match self.cpu_type {
            Some(cpu_type) => Ok(cpu_type),
            None => Err(EngineError::NotInitialized),
        }
    }

    fn bus_mask(&self) -> u32 {
        match self.cpu_type.map_or(32, CpuType::address_bus_bits) {
            32 => u32::MAX,
            bits => (1 << bits) - 1,
        }
    }

    fn slot(&self, page: u32) -> Option<&PageSlot> {
        self.slots.get(page as usize)
    }

    fn push(&mut self, record: EventRecord) {
        self.pending.push(record);
    }

    fn check_span(&self, start_page: u32, num_pages: u32) -> Result<(), EngineError> {
        let fits = start_page
            .checked_add(num_pages)
            .is_some_and(|end| end <= self.num_pages);
        if fits {
            Ok(())
        } else {
            Err(EngineError::PageOutOfRange {
                start_page,
                num_pages,
                max_pages: self.num_pages,
            })
        }
    }

    fn add_cycles(&mut self, kind: CycleCostKind) {
        let cycles = u64::from(cycle_cost(kind).unwrap_or(0));
        self.done_cycles += cycles;
        self.total_cycles += cycles;
    }

    fn frame_read(&self, frame: usize, offset: usize, width: AccessWidth) -> u32 {
        let bytes = &self.frames[frame][offset..offset + width.bytes() as usize];
        bytes.iter().fold(0, |acc, b| (acc << 8) | u32::from(*b))
    }

    fn frame_write(&mut self, frame: usize, offset: usize, width: AccessWidth, value: u32) {
        let len = width.bytes() as usize;
        let bytes = value.to_be_bytes();
        self.frames[frame][offset..offset + len].copy_from_slice(&bytes[4 - len..]);
    }

    const fn crosses_page(addr: u32, width: AccessWidth) -> bool {
        (addr & PAGE_MASK) + width.bytes() > PAGE_BYTES
    }

    // ----- CPU side -----

    fn cpu_access_fault(&mut self, access: &MemAccess) {
        let kind = if page_of(access.addr) >= self.num_pages {
            EventKind::MemBounds
        } else {
            EventKind::MemAccess
        };
        self.push(EventRecord::memory(kind, access));
    }

    fn callback_failed(&mut self, addr: u32, err: CallbackError) {
        self.push(
            EventRecord::new(EventKind::CallbackError, addr).with_data(EventData::Error(err)),
        );
    }

    fn trace_cpu_access(&mut self, access: &MemAccess) {
        let Some(hook) = self.cpu_mem_hook.as_mut() else {
            return;
        };
        match hook(access) {
            Ok(None) => {}
            Ok(Some(text)) => {
                let record = EventRecord::memory(EventKind::MemTrace, access);
                self.push(record.with_data(EventData::Text(text)));
            }
            Err(err) => self.callback_failed(access.addr, err),
        }
    }

    fn cpu_read(&mut self, access: MemAccess) -> Bus<u32> {
        let mut access = access;
        access.addr &= self.bus_mask();
        if Self::crosses_page(access.addr, access.width) {
            return self.cpu_read_split(access);
        }

        let value = match self.slot(page_of(access.addr)).cloned() {
            Some(PageSlot::Memory { frame, flags }) if flags.contains(MemFlags::READ) => {
                let offset = (access.addr & PAGE_MASK) as usize;
                self.frame_read(frame, offset, access.width)
            }
            Some(PageSlot::Empty(fill)) => access.width.truncate(fill),
            Some(PageSlot::Special(handlers)) => match handlers.read {
                None => 0,
                Some(read) => match read(&access) {
                    Ok(value) => access.width.truncate(value),
                    Err(err) => {
                        self.callback_failed(access.addr, err);
                        return Bus::Fault;
                    }
                },
            },
            _ => {
                self.cpu_access_fault(&access);
                return Bus::Fault;
            }
        };
        access.value = value;
        self.trace_cpu_access(&access);
        Bus::Ok(value)
    }

    fn cpu_read_split(&mut self, access: MemAccess) -> Bus<u32> {
        let mut value = 0;
        for i in 0..access.width.bytes() {
            let mut byte = access;
            byte.addr = access.addr.wrapping_add(i);
            byte.width = AccessWidth::Byte;
            match self.cpu_read(byte) {
                Bus::Ok(b) => value = (value << 8) | b,
                Bus::Fault => return Bus::Fault,
            }
        }
        Bus::Ok(value)
    }

    /// Writes are never retried; a failed write only queues its event.
    fn cpu_write(&mut self, access: MemAccess) {
        let mut access = access;
        access.addr &= self.bus_mask();
        if Self::crosses_page(access.addr, access.width) {
            let len = access.width.bytes();
            for i in 0..len {
                let mut byte = access;
                byte.addr = access.addr.wrapping_add(i);
                byte.width = AccessWidth::Byte;
                byte.value = (access.value >> (8 * (len - 1 - i))) & 0xFF;
                self.cpu_write(byte);
            }
            return;
        }

        match self.slot(page_of(access.addr)).cloned() {
            Some(PageSlot::Memory { frame, flags }) if flags.contains(MemFlags::WRITE) => {
                let offset = (access.addr & PAGE_MASK) as usize;
                self.frame_write(frame, offset, access.width, access.value);
            }
            Some(PageSlot::Empty(_)) => {}
            Some(PageSlot::Special(handlers)) => {
                if let Some(write) = handlers.write {
                    if let Err(err) = write(&access) {
                        self.callback_failed(access.addr, err);
                        return;
                    }
                }
            }
            _ => {
                self.cpu_access_fault(&access);
                return;
            }
        }
        self.trace_cpu_access(&access);
    }

    fn fetch(&mut self, addr: u32, width: AccessWidth) -> Bus<u32> {
        self.cpu_read(MemAccess::read(addr, width).program())
    }

    fn traps_enabled_at(&self, pc: u32) -> bool {
        matches!(
            self.slot(page_of(pc & self.bus_mask())),
            Some(PageSlot::Memory { flags, .. }) if flags.contains(MemFlags::TRAPS)
        )
    }

    fn record_pc(&mut self, pc: u32) {
        if self.pc_trace_depth == 0 {
            return;
        }
        if self.pc_trace.len() == self.pc_trace_depth {
            self.pc_trace.pop_front();
        }
        self.pc_trace.push_back(pc);
    }

    /// Executes one instruction.
    fn step(&mut self) -> Result<(), EngineError> {
        let pc = self.ctx.pc();
        self.record_pc(pc);

        let Bus::Ok(word) = self.fetch(pc, AccessWidth::Word) else {
            return Ok(());
        };
        let opcode = u16::try_from(word & 0xFFFF).unwrap_or_default();

        if let Some(hook) = self.instr_hook.as_mut() {
            match hook(pc, opcode) {
                Ok(None) => {}
                Ok(Some(text)) => {
                    let record = EventRecord::new(EventKind::InstrHook, pc)
                        .with_value(u32::from(opcode))
                        .with_data(EventData::Text(text));
                    self.push(record);
                }
                Err(err) => {
                    self.callback_failed(pc, err);
                    return Ok(());
                }
            }
        }

        let next = pc.wrapping_add(2);
        match opcode {
            OP_RESET => {
                self.ctx.set_pc(next);
                self.add_cycles(CycleCostKind::Reset);
                self.push(EventRecord::new(EventKind::Reset, next));
            }
            OP_NOP => {
                self.ctx.set_pc(next);
                self.add_cycles(CycleCostKind::Nop);
            }
            OP_RTS => {
                let sp = self.ctx.sp();
                self.add_cycles(CycleCostKind::Rts);
                if let Bus::Ok(ret) = self.cpu_read(MemAccess::read(sp, AccessWidth::Long)) {
                    self.ctx.set_sp(sp.wrapping_add(4));
                    self.ctx.set_pc(ret);
                }
            }
            OP_MOVE_IMM_D0 => {
                self.add_cycles(CycleCostKind::MoveImmediate);
                if let Bus::Ok(imm) = self.fetch(next, AccessWidth::Long) {
                    self.ctx.set_reg(Register::D0, imm);
                    self.ctx.set_pc(next.wrapping_add(4));
                }
            }
            OP_MOVE_ABS_D0 => {
                self.add_cycles(CycleCostKind::MoveLoad);
                if let Bus::Ok(addr) = self.fetch(next, AccessWidth::Long) {
                    self.ctx.set_pc(next.wrapping_add(4));
                    if let Bus::Ok(value) =
                        self.cpu_read(MemAccess::read(addr, AccessWidth::Long))
                    {
                        self.ctx.set_reg(Register::D0, value);
                    }
                }
            }
            OP_MOVE_D0_ABS => {
                self.add_cycles(CycleCostKind::MoveStore);
                if let Bus::Ok(addr) = self.fetch(next, AccessWidth::Long) {
                    self.ctx.set_pc(next.wrapping_add(4));
                    let value = self.ctx.reg(Register::D0);
                    self.cpu_write(MemAccess::write(addr, AccessWidth::Long, value));
                }
            }
            op if op & 0xF000 == 0xA000 && self.traps_enabled_at(pc) => {
                self.ctx.set_pc(next);
                self.add_cycles(CycleCostKind::AlineTrap);
                let record = EventRecord::new(EventKind::AlineTrap, pc).with_value(u32::from(op));
                self.push(record);
            }
            _ => return Err(EngineError::IllegalInstruction { pc, opcode }),
        }
        Ok(())
    }

    // ----- host side -----

    fn host_slot(&self, addr: u32) -> Result<PageSlot, EngineError> {
        match self.slot(page_of(addr)) {
            None | Some(PageSlot::Unmapped) => Err(EngineError::Unmapped { addr }),
            Some(slot) => Ok(slot.clone()),
        }
    }

    fn host_read(&mut self, addr: u32, width: AccessWidth) -> Result<u32, EngineError> {
        let addr = addr & self.bus_mask();
        if Self::crosses_page(addr, width) {
            let mut value = 0;
            for i in 0..width.bytes() {
                value = (value << 8) | self.host_read(addr.wrapping_add(i), AccessWidth::Byte)?;
            }
            return Ok(value);
        }
        match self.host_slot(addr)? {
            PageSlot::Memory { frame, .. } => {
                Ok(self.frame_read(frame, (addr & PAGE_MASK) as usize, width))
            }
            PageSlot::Empty(fill) => Ok(width.truncate(fill)),
            PageSlot::Special(handlers) => match handlers.read {
                Some(read) => Ok(width.truncate(read(&MemAccess::read(addr, width))?)),
                None => Ok(0),
            },
            PageSlot::Unmapped => Err(EngineError::Unmapped { addr }),
        }
    }

    fn host_write(&mut self, addr: u32, width: AccessWidth, value: u32) -> Result<(), EngineError> {
        let addr = addr & self.bus_mask();
        if Self::crosses_page(addr, width) {
            let len = width.bytes();
            for i in 0..len {
                let byte = (value >> (8 * (len - 1 - i))) & 0xFF;
                self.host_write(addr.wrapping_add(i), AccessWidth::Byte, byte)?;
            }
            return Ok(());
        }
        match self.host_slot(addr)? {
            PageSlot::Memory { frame, flags } => {
                if !flags.contains(MemFlags::WRITE) {
                    return Err(EngineError::ReadOnly { addr });
                }
                self.frame_write(frame, (addr & PAGE_MASK) as usize, width, value);
                Ok(())
            }
            PageSlot::Empty(_) => Ok(()),
            PageSlot::Special(handlers) => {
                if let Some(write) = handlers.write {
                    write(&MemAccess::write(addr, width, value))?;
                }
                Ok(())
            }
            PageSlot::Unmapped => Err(EngineError::Unmapped { addr }),
        }
    }

    fn trace_api_access(&mut self, access: &MemAccess) -> Result<(), EngineError> {
        if let Some(hook) = self.api_mem_hook.as_mut() {
            hook(access)?;
        }
        Ok(())
    }
}

impl Engine for MiniEngine {
    fn init(
        &mut self,
        cpu_type: CpuType,
        num_pages: u32,
        labels_enabled: bool,
    ) -> Result<(), EngineError> {
        if num_pages > cpu_type.max_pages() {
            return Err(EngineError::PageOutOfRange {
                start_page: 0,
                num_pages,
                max_pages: cpu_type.max_pages(),
            });
        }
        *self = Self {
            cpu_type: Some(cpu_type),
            num_pages,
            labels_enabled,
            slots: vec![PageSlot::Unmapped; num_pages as usize],
            ..Self::default()
        };
        Ok(())
    }

    fn shutdown(&mut self) {
        *self = Self::default();
    }

    fn map_region(
        &mut self,
        start_page: u32,
        num_pages: u32,
        binding: RegionBinding,
    ) -> Result<(), EngineError> {
        self.ensure_init()?;
        self.check_span(start_page, num_pages)?;
        let pages = start_page as usize..(start_page + num_pages) as usize;

        match binding {
            RegionBinding::Memory { flags, content } => {
                let content = content.as_deref().unwrap_or(&[]);
                for (i, page) in pages.enumerate() {
                    let mut frame = vec![0u8; PAGE_LEN].into_boxed_slice();
                    let start = (i * PAGE_LEN).min(content.len());
                    let end = ((i + 1) * PAGE_LEN).min(content.len());
                    frame[..end - start].copy_from_slice(&content[start..end]);
                    self.frames.push(frame);
                    self.slots[page] = PageSlot::Memory {
                        frame: self.frames.len() - 1,
                        flags,
                    };
                }
            }
            RegionBinding::Special(handlers) => {
                for page in pages {
                    self.slots[page] = PageSlot::Special(handlers.clone());
                }
            }
            RegionBinding::Empty(fill) => {
                for page in pages {
                    self.slots[page] = PageSlot::Empty(fill);
                }
            }
            RegionBinding::Mirror { base_page } => {
                self.check_span(base_page, num_pages)?;
                for (page, base) in (start_page..).zip(base_page..base_page + num_pages) {
                    match &self.slots[base as usize] {
                        PageSlot::Unmapped => {
                            return Err(EngineError::InvalidMirror {
                                page,
                                base_page: base,
                            })
                        }
                        slot => self.slots[page as usize] = slot.clone(),
                    }
                }
            }
        }
        Ok(())
    }

    fn pulse_reset(&mut self) -> Result<(), EngineError> {
        self.ensure_init()?;
        let sp = self.host_read(0, AccessWidth::Long)?;
        let pc = self.host_read(4, AccessWidth::Long)?;
        self.ctx = CpuContext::default();
        self.ctx.set_sr(SR_RESET);
        self.ctx.set_sp(sp);
        self.ctx.set_isp(sp);
        self.ctx.set_pc(pc);
        self.pending.clear();
        Ok(())
    }

    fn execute_until_event(&mut self, cycle_budget: u64) -> Result<usize, EngineError> {
        self.ensure_init()?;
        self.done_cycles = 0;
        loop {
            self.step()?;
            if !self.pending.is_empty() || (cycle_budget > 0 && self.done_cycles >= cycle_budget)
            {
                break;
            }
        }
        Ok(self.pending.len())
    }

    fn fetch_pending_events(&mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.pending)
    }

    fn context(&self) -> CpuContext {
        self.ctx
    }

    fn set_context(&mut self, ctx: &CpuContext) {
        self.ctx = *ctx;
    }

    fn clear_cycle_counters(&mut self) {
        self.done_cycles = 0;
        self.total_cycles = 0;
    }

    fn done_cycles(&self) -> u64 {
        self.done_cycles
    }

    fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    fn read_memory(&mut self, addr: u32, width: AccessWidth) -> Result<u32, EngineError> {
        self.ensure_init()?;
        let value = self.host_read(addr, width)?;
        let mut access = MemAccess::read(addr, width);
        access.value = value;
        self.trace_api_access(&access)?;
        Ok(value)
    }

    fn write_memory(
        &mut self,
        addr: u32,
        width: AccessWidth,
        value: u32,
    ) -> Result<(), EngineError> {
        self.ensure_init()?;
        self.host_write(addr, width, value)?;
        self.trace_api_access(&MemAccess::write(addr, width, value))
    }

    fn register_trace_hook(&mut self, hook: TraceHook) {
        match hook {
            TraceHook::Instruction(f) => self.instr_hook = Some(f),
            TraceHook::CpuMemory(f) => self.cpu_mem_hook = Some(f),
            TraceHook::ApiMemory(f) => self.api_mem_hook = Some(f),
        }
    }

    fn clear_trace_hook(&mut self, kind: TraceHookKind) {
        match kind {
            TraceHookKind::Instruction => self.instr_hook = None,
            TraceHookKind::CpuMemory => self.cpu_mem_hook = None,
            TraceHookKind::ApiMemory => self.api_mem_hook = None,
        }
    }

    fn setup_pc_trace(&mut self, depth: usize) {
        self.pc_trace_depth = depth;
        self.pc_trace.clear();
    }

    fn pc_trace(&self) -> Vec<u32> {
        self.pc_trace.iter().copied().collect()
    }
}
