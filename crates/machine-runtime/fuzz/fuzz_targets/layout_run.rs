#![no_main]

use libfuzzer_sys::fuzz_target;
use machine_runtime::{
    parse_size, AccessWidth, CpuConfig, Engine, MemoryLayoutBuilder, MiniEngine, RangeOptions,
    RunConfig, Runtime, KIB,
};

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = parse_size(text, KIB);
    }

    let (ops, program) = data.split_at(data.len().min(24));
    let mut layout = MemoryLayoutBuilder::new();
    let _ = layout.add_ram_range(0, 1, &RangeOptions::new());
    for op in ops.chunks_exact(3) {
        let start = u32::from(op[1] & 0x1F);
        let len = u32::from(op[2] & 0x07);
        let opts = RangeOptions::new().sparse(op[0] & 0x80 != 0);
        let _ = match op[0] & 0x03 {
            0 => layout.add_ram_range(start, len, &opts),
            1 => layout.add_reserve_range(start, len, &opts),
            2 => layout.add_empty_range(start, len, 0xFFFF_FFFF, &opts),
            _ => layout.add_mirror_range(start, len, 0, &opts),
        };
    }
    for pair in layout.ranges().windows(2) {
        assert!(pair[0].next_page() <= pair[1].start_page);
    }

    let mut rt = Runtime::new(MiniEngine::new());
    let config = RunConfig {
        cycles_per_run: 256,
        ..RunConfig::default()
    };
    if rt.init(CpuConfig::default(), layout, config).is_err() {
        return;
    }
    let _ = rt.reset(0x100, 0x8000);
    for (i, word) in (0u32..).zip(program.chunks_exact(2).take(64)) {
        let value = u32::from(u16::from_be_bytes([word[0], word[1]]));
        let _ = rt.engine_mut().write_memory(0x100 + 2 * i, AccessWidth::Word, value);
    }
    rt.abort_signal().trigger();
    let _ = rt.run();
});
