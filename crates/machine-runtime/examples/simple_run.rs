//! Boots a tiny layout on the reference engine and runs a program that calls
//! back into the host through an A-line trap.
//!
//! ```sh
//! RUST_LOG=debug cargo run -p machine-runtime --example simple_run
//! ```

use std::cell::Cell;
use std::rc::Rc;

use log::info;
use machine_runtime::engine::mini::{OP_MOVE_D0_ABS, OP_MOVE_IMM_D0, OP_RESET};
use machine_runtime::{
    AccessWidth, CpuConfig, CpuType, Engine, MemoryLayoutBuilder, MiniEngine, RangeOptions,
    Register, RunConfig, Runtime, RuntimeError, SpecialHandlers, TrapMode, KIB,
};
use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

const CODE: u32 = 0x1000;
const UART: u32 = 0x0002_0000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let written = Rc::new(Cell::new(0u32));
    let sink = Rc::clone(&written);
    let uart = SpecialHandlers::new(
        |_| Ok(0),
        move |access| {
            sink.set(access.value);
            Ok(())
        },
    );

    let mut layout = MemoryLayoutBuilder::new();
    layout.add_ram_range_addr(0u32, "128k", KIB, &RangeOptions::new().named("ram"))?;
    layout.add_special_range_addr(UART, "64k", KIB, uart, &RangeOptions::new().named("uart"))?;
    layout.add_reserve_range_addr("3p", 1u32, 64 * KIB, &RangeOptions::new())?;
    println!("layout: {}", layout.page_map());

    let cpu = CpuConfig::new("68000".parse::<CpuType>()?);
    let mut rt = Runtime::new(MiniEngine::new());
    rt.init(cpu, layout, RunConfig::default())?;
    rt.labels_mut().add(CODE, 0x20, "main".into())?;

    let trap = rt.traps_mut().setup(TrapMode::Default, |rt, event| {
        let d0 = rt.context().reg(Register::D0);
        info!("host call from {} with d0={d0:#x}", rt.describe_addr(event.addr));
        Ok::<(), RuntimeError>(())
    })?;

    let program = [
        OP_MOVE_IMM_D0,
        0x0000,
        0x0042,
        trap,
        OP_MOVE_D0_ABS,
        u16::try_from(UART >> 16)?,
        u16::try_from(UART & 0xFFFF)?,
        OP_RESET,
    ];
    for (i, word) in (0u32..).zip(program) {
        rt.engine_mut()
            .write_memory(CODE + 2 * i, AccessWidth::Word, u32::from(word))?;
    }
    rt.reset(CODE, 0x8000)?;

    let run = rt.run()?;
    println!("{run}");
    println!("{}", rt.context());
    println!("uart received {:#x}", written.get());
    rt.shutdown()?;
    Ok(())
}
