use super::cartridge::{is_valid_rom, Cartridge, CartridgeError, RomHeader, LOGO};
use super::interrupts::InterruptController;
use super::mmu::Mmu;
use super::ppu::{Mode, Ppu};
use super::state::{state_file_name, StateLoadError};
use super::timer::Timer;
use super::{EventMask, GameBoy, JoypadState, RunError};
use crate::cpu::CpuFault;
use crate::CYCLES_PER_FRAME;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn header_checksum(rom: &[u8]) -> u8 {
    rom[0x0134..0x014D]
        .iter()
        .fold(0u8, |sum, &byte| sum.wrapping_sub(byte).wrapping_sub(1))
}

fn global_checksum(rom: &[u8]) -> u16 {
    rom.iter()
        .enumerate()
        .filter(|&(i, _)| i != 0x014E && i != 0x014F)
        .fold(0u16, |sum, (_, &byte)| sum.wrapping_add(byte as u16))
}

/// A minimal 32 KiB bankless image: NOP at the entry point, a jump over
/// the header, then `program` at 0x0150.
fn test_rom_with_ram(program: &[u8], ram_size_code: u8) -> Vec<u8> {
    init_logs();
    let mut rom = vec![0u8; 0x8000];
    rom[0x0100] = 0x00;
    rom[0x0101] = 0xC3; // JP 0x0150
    rom[0x0102] = 0x50;
    rom[0x0103] = 0x01;
    rom[0x0104..0x0134].copy_from_slice(&LOGO);
    rom[0x0134..0x0138].copy_from_slice(b"TEST");
    rom[0x0147] = 0x00;
    rom[0x0148] = 0x00;
    rom[0x0149] = ram_size_code;
    rom[0x014D] = header_checksum(&rom);
    rom[0x0150..0x0150 + program.len()].copy_from_slice(program);
    let global = global_checksum(&rom);
    rom[0x014E..0x0150].copy_from_slice(&global.to_be_bytes());
    rom
}

fn test_rom(program: &[u8]) -> Vec<u8> {
    test_rom_with_ram(program, 0x00)
}

const SPIN: &[u8] = &[0x18, 0xFE]; // JR -2

/// Shade of pixel `x` on row `y` of a packed frame buffer.
fn pixel(frame: &[u8], x: usize, y: usize) -> u8 {
    let index = y * crate::SCREEN_WIDTH + x;
    (frame[index / 4] >> (6 - (index % 4) * 2)) & 0x03
}

// --- cartridge ---

#[test]
fn wellformed_rom_is_accepted() {
    let rom = test_rom(SPIN);
    assert!(is_valid_rom(&rom));
    let cartridge = Cartridge::new(&rom).expect("rom should validate");
    assert_eq!(cartridge.header().title_str(), "TEST");
    assert_eq!(cartridge.header().rom_size_bytes(), Some(0x8000));
    assert_eq!(cartridge.header().ram_size_bytes(), Some(0));
}

#[test]
fn rom_without_logo_is_rejected() {
    let mut rom = test_rom(SPIN);
    rom[0x0110] ^= 0xFF;
    assert!(!is_valid_rom(&rom));
    assert!(matches!(
        Cartridge::new(&rom),
        Err(CartridgeError::InvalidRom(_))
    ));
}

#[test]
fn header_checksum_mismatch_is_rejected() {
    let mut rom = test_rom(SPIN);
    rom[0x0134] = b'X'; // title changed after the checksum was computed
    assert!(matches!(
        Cartridge::new(&rom),
        Err(CartridgeError::InvalidRom(_))
    ));
}

#[test]
fn banked_cartridge_types_are_rejected() {
    let mut rom = test_rom(SPIN);
    rom[0x0147] = 0x01;
    rom[0x014D] = header_checksum(&rom);
    assert!(matches!(
        Cartridge::new(&rom),
        Err(CartridgeError::UnsupportedType(0x01))
    ));
}

#[test]
fn rom_shorter_than_declared_size_is_rejected() {
    let rom = test_rom(SPIN);
    assert!(matches!(
        Cartridge::new(&rom[..0x4000]),
        Err(CartridgeError::InvalidRom(_))
    ));
}

#[test]
fn header_parse_reads_the_global_checksum_big_endian() {
    let rom = test_rom(SPIN);
    let header = RomHeader::parse(&rom).expect("header should parse");
    assert_eq!(header.global_checksum, global_checksum(&rom));
}

#[test]
fn rom_window_writes_drive_the_banking_unit() {
    let rom = test_rom(SPIN);
    let mut cartridge = Cartridge::new(&rom).expect("rom should validate");
    assert_eq!(cartridge.banking_snapshot(), (0, 1, 0, 0));

    cartridge.rom_write(0x2000, 0x05);
    cartridge.rom_write(0x4000, 0x02);
    cartridge.rom_write(0x6000, 0x01);
    assert_eq!(cartridge.banking_snapshot(), (0, 5, 2, 1));

    // Bank 0 in the switchable slot reads as bank 1.
    cartridge.rom_write(0x2000, 0x00);
    assert_eq!(cartridge.banking_snapshot(), (0, 1, 2, 1));
}

// --- memory mapper ---

#[test]
fn work_ram_writes_mirror_into_the_echo_range() {
    let mut mmu = Mmu::new();
    mmu.write8(0xC123, 0xAB);
    assert_eq!(mmu.peek(0xE123), 0xAB);
    mmu.write8(0xE456, 0xCD);
    assert_eq!(mmu.peek(0xC456), 0xCD);
}

#[test]
fn mapper_tracks_the_most_recent_access() {
    let mut mmu = Mmu::new();
    mmu.write8(0xC000, 0x11);
    mmu.read8(0xD000);
    assert_eq!(mmu.last_write_address(), 0xC000);
    assert_eq!(mmu.last_value_written(), 0x11);
    assert_eq!(mmu.last_read_address(), 0xD000);
}

// --- timer ---

#[test]
fn divider_is_the_counter_high_byte() {
    let mut timer = Timer::new();
    let mut irq = InterruptController::new();
    timer.tick(256, &mut irq);
    assert_eq!(timer.read_divider(), 1);
    timer.write_divider(&mut irq);
    assert_eq!(timer.read_divider(), 0);
}

#[test]
fn overflow_fires_immediately_and_reloads_a_cycle_later() {
    let mut timer = Timer::new();
    let mut irq = InterruptController::new();
    timer.write_control(0x05); // enabled, fastest tap (bit 3)
    timer.write_modulo(0x23);

    // 256 falling edges of bit 3: the 256th increment overflows.
    timer.tick(4096, &mut irq);
    assert_eq!(timer.read_counter(), 0x00);
    assert_ne!(irq.read_flags() & 0x04, 0);

    // Next machine cycle picks up the modulo value.
    timer.tick(4, &mut irq);
    assert_eq!(timer.read_counter(), 0x23);
}

#[test]
fn counter_write_during_reload_cancels_it() {
    let mut timer = Timer::new();
    let mut irq = InterruptController::new();
    timer.write_control(0x05);
    timer.write_modulo(0x23);
    timer.tick(4096, &mut irq);

    timer.write_counter(0x10);
    timer.tick(4, &mut irq);
    assert_eq!(timer.read_counter(), 0x10);
}

#[test]
fn disabled_timer_never_increments() {
    let mut timer = Timer::new();
    let mut irq = InterruptController::new();
    timer.write_control(0x01); // tap selected but not enabled
    timer.tick(65536, &mut irq);
    assert_eq!(timer.read_counter(), 0);
    assert_eq!(irq.read_flags() & 0x04, 0);
}

// --- ppu ---

fn ppu_fixture() -> (Ppu, Mmu, InterruptController) {
    init_logs();
    let mut mmu = Mmu::new();
    mmu.poke(0xFF40, 0x91);
    mmu.poke(0xFF47, 0xE4);
    (Ppu::new(), mmu, InterruptController::new())
}

#[test]
fn mode_sequence_follows_the_dot_budgets() {
    let (mut ppu, mut mmu, mut irq) = ppu_fixture();
    ppu.tick(79, &mut mmu, &mut irq);
    assert_eq!(ppu.mode(), Mode::OamScan);
    ppu.tick(1, &mut mmu, &mut irq);
    assert_eq!(ppu.mode(), Mode::Transfer);
    ppu.tick(172, &mut mmu, &mut irq);
    assert_eq!(ppu.mode(), Mode::HBlank);
    ppu.tick(204, &mut mmu, &mut irq);
    assert_eq!(ppu.mode(), Mode::OamScan);
    assert_eq!(ppu.line(), 1);
    assert_eq!(mmu.peek(0xFF44), 1);
}

#[test]
fn one_frame_is_exactly_70224_dots() {
    let (mut ppu, mut mmu, mut irq) = ppu_fixture();
    assert!(ppu.tick(CYCLES_PER_FRAME, &mut mmu, &mut irq));
    assert_eq!(ppu.line(), 0);
    assert_eq!(ppu.mode(), Mode::OamScan);
}

#[test]
fn vblank_entry_requests_the_vblank_interrupt() {
    let (mut ppu, mut mmu, mut irq) = ppu_fixture();
    ppu.tick(456 * 144, &mut mmu, &mut irq);
    assert_eq!(ppu.mode(), Mode::VBlank);
    assert_ne!(irq.read_flags() & 0x01, 0);
}

#[test]
fn lyc_match_requests_stat_when_enabled() {
    let (mut ppu, mut mmu, mut irq) = ppu_fixture();
    mmu.poke(0xFF45, 10);
    mmu.poke(0xFF41, 0x40);
    ppu.tick(456 * 10, &mut mmu, &mut irq);
    assert_eq!(ppu.line(), 10);
    assert_ne!(irq.read_flags() & 0x02, 0);
    // Coincidence bit mirrors the match.
    assert_ne!(mmu.peek(0xFF41) & 0x04, 0);
}

#[test]
fn display_off_holds_line_zero() {
    let (mut ppu, mut mmu, mut irq) = ppu_fixture();
    mmu.poke(0xFF40, 0x00);
    assert!(!ppu.tick(CYCLES_PER_FRAME, &mut mmu, &mut irq));
    assert_eq!(ppu.line(), 0);
    assert_eq!(mmu.peek(0xFF44), 0);
}

/// Solid color-3 tile at index 1 in the 0x8000 tile data block.
fn install_solid_tile(mmu: &mut Mmu) {
    for byte in 0..16u16 {
        mmu.poke(0x8010 + byte, 0xFF);
    }
}

#[test]
fn at_most_ten_sprites_render_on_one_scanline() {
    let (mut ppu, mut mmu, mut irq) = ppu_fixture();
    mmu.poke(0xFF40, 0x93); // display, unsigned tiles, sprites, background
    mmu.poke(0xFF48, 0xE4); // OBP0: color 3 -> shade 3
    install_solid_tile(&mut mmu);

    // Eleven sprites side by side on line 0; only the first ten by OAM
    // order participate.
    for i in 0..11u16 {
        let base = 0xFE00 + i * 4;
        mmu.poke(base, 16);
        mmu.poke(base + 1, 8 * (i as u8 + 1));
        mmu.poke(base + 2, 1);
        mmu.poke(base + 3, 0);
    }

    ppu.tick(CYCLES_PER_FRAME, &mut mmu, &mut irq);
    let frame = ppu.presented_frame();
    assert_eq!(pixel(frame, 0, 0), 3);
    assert_eq!(pixel(frame, 79, 0), 3);
    // Pixels of the eleventh sprite fall back to the background.
    assert_eq!(pixel(frame, 80, 0), 0);
}

#[test]
fn lower_x_wins_between_overlapping_sprites() {
    let (mut ppu, mut mmu, mut irq) = ppu_fixture();
    mmu.poke(0xFF40, 0x93);
    mmu.poke(0xFF48, 0xE4); // OBP0: color 3 -> shade 3
    mmu.poke(0xFF49, 0x40); // OBP1: color 3 -> shade 1
    install_solid_tile(&mut mmu);

    // Sprite 0 at pixel 4 with OBP0, sprite 1 at pixel 0 with OBP1. The
    // lower X coordinate wins the overlap despite the higher OAM index.
    mmu.poke(0xFE00, 16);
    mmu.poke(0xFE01, 12);
    mmu.poke(0xFE02, 1);
    mmu.poke(0xFE03, 0x00);
    mmu.poke(0xFE04, 16);
    mmu.poke(0xFE05, 8);
    mmu.poke(0xFE06, 1);
    mmu.poke(0xFE07, 0x10); // OBP1

    ppu.tick(CYCLES_PER_FRAME, &mut mmu, &mut irq);
    let frame = ppu.presented_frame();
    assert_eq!(pixel(frame, 4, 0), 1);
    assert_eq!(pixel(frame, 11, 0), 3);
    assert_eq!(pixel(frame, 12, 0), 0);
}

/// Tile 2: only the top-left pixel is color 3, everything else color 0.
/// Asymmetric on both axes, so flips are observable.
fn install_corner_tile(mmu: &mut Mmu) {
    mmu.poke(0x8020, 0x80);
    mmu.poke(0x8021, 0x80);
    for byte in 2..16u16 {
        mmu.poke(0x8020 + byte, 0x00);
    }
}

#[test]
fn sprite_flip_attributes_mirror_the_tile() {
    let (mut ppu, mut mmu, mut irq) = ppu_fixture();
    mmu.poke(0xFF40, 0x93);
    mmu.poke(0xFF48, 0xE4); // OBP0: color 3 -> shade 3
    install_corner_tile(&mut mmu);

    // Sprite 0: X flip at pixels 0-7; the colored pixel moves from
    // column 0 to column 7.
    mmu.poke(0xFE00, 16);
    mmu.poke(0xFE01, 8);
    mmu.poke(0xFE02, 2);
    mmu.poke(0xFE03, 0x20);
    // Sprite 1: Y flip at pixels 16-23; the colored row moves from
    // line 0 to line 7.
    mmu.poke(0xFE04, 16);
    mmu.poke(0xFE05, 24);
    mmu.poke(0xFE06, 2);
    mmu.poke(0xFE07, 0x40);

    ppu.tick(CYCLES_PER_FRAME, &mut mmu, &mut irq);
    let frame = ppu.presented_frame();
    assert_eq!(pixel(frame, 7, 0), 3);
    assert_eq!(pixel(frame, 0, 0), 0);
    assert_eq!(pixel(frame, 16, 7), 3);
    assert_eq!(pixel(frame, 16, 0), 0);
}

#[test]
fn behind_bg_sprites_lose_to_nonzero_background() {
    let (mut ppu, mut mmu, mut irq) = ppu_fixture();
    mmu.poke(0xFF40, 0x93);
    mmu.poke(0xFF48, 0xE4); // OBP0: color 3 -> shade 3
    install_solid_tile(&mut mmu);
    // Tile 3 is solid color 1; map it into the first background column.
    for row in 0..8u16 {
        mmu.poke(0x8030 + row * 2, 0xFF);
        mmu.poke(0x8031 + row * 2, 0x00);
    }
    mmu.poke(0x9800, 3);

    // Both sprites carry the background-priority bit. Sprite 0 sits on
    // the color-1 background column, sprite 1 on a color-0 one.
    mmu.poke(0xFE00, 16);
    mmu.poke(0xFE01, 8);
    mmu.poke(0xFE02, 1);
    mmu.poke(0xFE03, 0x80);
    mmu.poke(0xFE04, 16);
    mmu.poke(0xFE05, 16);
    mmu.poke(0xFE06, 1);
    mmu.poke(0xFE07, 0x80);

    ppu.tick(CYCLES_PER_FRAME, &mut mmu, &mut irq);
    let frame = ppu.presented_frame();
    // BGP 0xE4 maps color 1 to shade 1; the background wins there.
    assert_eq!(pixel(frame, 0, 0), 1);
    // Over background color 0 the sprite shows despite the bit.
    assert_eq!(pixel(frame, 8, 0), 3);
}

#[test]
fn window_overlays_the_background() {
    let (mut ppu, mut mmu, mut irq) = ppu_fixture();
    // Display, window on, window map 0x9C00, unsigned tiles, background.
    mmu.poke(0xFF40, 0xF1);
    mmu.poke(0xFF4A, 0); // WY
    mmu.poke(0xFF4B, 7); // WX: window starts at pixel 0
    install_solid_tile(&mut mmu);
    // Window map shows tile 1 everywhere; background map stays tile 0.
    for offset in 0..0x400u16 {
        mmu.poke(0x9C00 + offset, 1);
    }

    ppu.tick(CYCLES_PER_FRAME, &mut mmu, &mut irq);
    let frame = ppu.presented_frame();
    assert_eq!(pixel(frame, 0, 0), 3);
    assert_eq!(pixel(frame, 159, 143), 3);
}

// --- assembled machine ---

#[test]
fn one_frame_of_advance_reports_vblank() {
    let mut gb = GameBoy::new(&test_rom(SPIN)).expect("rom should load");
    let events = gb.advance(CYCLES_PER_FRAME).expect("should run");
    assert!(events.contains(EventMask::VBLANK));
}

#[test]
fn stores_reach_work_ram_and_its_echo() {
    // LD A, 0x5A; LD (0xC100), A; spin.
    let program = [0x3E, 0x5A, 0xEA, 0x00, 0xC1, 0x18, 0xFE];
    let mut gb = GameBoy::new(&test_rom(&program)).expect("rom should load");
    gb.advance(100).expect("should run");
    assert_eq!(gb.memory()[0xC100], 0x5A);
    assert_eq!(gb.memory()[0xE100], 0x5A);
}

#[test]
fn oam_dma_copies_from_the_source_page() {
    // LD A, 0x77; LD (0xC000), A; LD A, 0xC0; LDH (0x46), A; spin.
    let program = [0x3E, 0x77, 0xEA, 0x00, 0xC0, 0x3E, 0xC0, 0xE0, 0x46, 0x18, 0xFE];
    let mut gb = GameBoy::new(&test_rom(&program)).expect("rom should load");
    gb.advance(200).expect("should run");
    assert_eq!(gb.memory()[0xFE00], 0x77);
}

#[test]
fn joyp_reads_selected_group_active_low() {
    // Select the d-pad group, read JOYP, store it to 0xC000; spin.
    let program = [0x3E, 0x20, 0xE0, 0x00, 0xF0, 0x00, 0xEA, 0x00, 0xC0, 0x18, 0xFE];
    let mut gb = GameBoy::new(&test_rom(&program)).expect("rom should load");
    gb.set_joypad(JoypadState::RIGHT);
    gb.advance(200).expect("should run");
    assert_eq!(gb.memory()[0xC000], 0xEE);
}

#[test]
fn timer_interrupt_is_serviced_through_the_vector() {
    // Enable the timer interrupt, start the timer at the fastest tap,
    // enable IME and halt; the 0x0050 handler writes a marker.
    let program = [
        0x3E, 0x04, // LD A, 0x04
        0xEA, 0xFF, 0xFF, // LD (0xFFFF), A
        0x3E, 0x05, // LD A, 0x05
        0xE0, 0x07, // LDH (0x07), A
        0xFB, // EI
        0x76, // HALT
    ];
    let mut rom = test_rom(&program);
    // Handler: LD A, 0x42; LD (0xC000), A; spin.
    let handler = [0x3E, 0x42, 0xEA, 0x00, 0xC0, 0x18, 0xFE];
    rom[0x0050..0x0050 + handler.len()].copy_from_slice(&handler);
    let global = global_checksum(&rom);
    rom[0x014E..0x0150].copy_from_slice(&global.to_be_bytes());

    let mut gb = GameBoy::new(&rom).expect("rom should load");
    gb.advance(20_000).expect("should run");
    assert_eq!(gb.memory()[0xC000], 0x42);
}

#[test]
fn undefined_opcode_stops_the_machine() {
    let mut gb = GameBoy::new(&test_rom(&[0xDD])).expect("rom should load");
    assert_eq!(
        gb.advance(100),
        Err(RunError::Cpu(CpuFault::UndefinedOpcode {
            address: 0x0150,
            opcode: 0xDD,
        }))
    );
}

#[test]
fn reset_returns_to_the_entry_point() {
    let mut gb = GameBoy::new(&test_rom(SPIN)).expect("rom should load");
    gb.advance(1000).expect("should run");
    gb.reset();
    assert_eq!(gb.cpu_registers().pc, 0x0100);
}

#[test]
fn external_ram_is_visible_to_both_sides() {
    // LD A, 0x99; LD (0xA000), A; spin.
    let program = [0x3E, 0x99, 0xEA, 0x00, 0xA0, 0x18, 0xFE];
    let rom = test_rom_with_ram(&program, 0x02);
    let mut gb = GameBoy::new(&rom).expect("rom should load");
    assert_eq!(gb.external_ram().len(), 8 * 1024);

    let saved = vec![0x5Au8; 8 * 1024];
    gb.load_external_ram(&saved);
    assert_eq!(gb.external_ram()[100], 0x5A);

    gb.advance(100).expect("should run");
    assert_eq!(gb.external_ram()[0], 0x99);
}

#[test]
fn debugger_attach_and_detach_latch_events() {
    let mut gb = GameBoy::new(&test_rom(SPIN)).expect("rom should load");
    gb.set_debugger_attached(true);
    gb.set_debugger_attached(true); // no edge, no second event
    let events = gb.advance(0).expect("should run");
    assert_eq!(events, EventMask::DEBUGGER_CONNECTED);

    gb.set_debugger_attached(false);
    let events = gb.advance(0).expect("should run");
    assert_eq!(events, EventMask::DEBUGGER_DISCONNECTED);
}

// --- save states ---

#[test]
fn save_and_load_round_trip_restores_execution_state() {
    let mut gb = GameBoy::new(&test_rom(SPIN)).expect("rom should load");
    gb.advance(1_000).expect("should run");

    let mut state = vec![0u8; gb.state_size()];
    gb.save_state(&mut state).expect("state should serialize");
    let saved_regs = gb.cpu_registers();
    let saved_memory = gb.memory().to_vec();
    let events = gb.advance(0).expect("should run");
    assert!(events.contains(EventMask::STATE_SAVED));

    gb.advance(5_000).expect("should run");
    gb.load_state(&state).expect("state should restore");
    assert_eq!(gb.cpu_registers(), saved_regs);
    assert_eq!(gb.memory(), &saved_memory[..]);
    let events = gb.advance(0).expect("should run");
    assert!(events.contains(EventMask::STATE_LOADED));
}

#[test]
fn save_rejects_a_wrongly_sized_buffer() {
    let mut gb = GameBoy::new(&test_rom(SPIN)).expect("rom should load");
    let mut short = vec![0u8; 16];
    assert!(gb.save_state(&mut short).is_err());
}

#[test]
fn load_rejects_garbage() {
    let mut gb = GameBoy::new(&test_rom(SPIN)).expect("rom should load");
    assert_eq!(
        gb.load_state(b"junk"),
        Err(StateLoadError::NotAStateFile)
    );
}

#[test]
fn load_rejects_a_version_mismatch() {
    let mut gb = GameBoy::new(&test_rom(SPIN)).expect("rom should load");
    let mut state = vec![0u8; gb.state_size()];
    gb.save_state(&mut state).expect("state should serialize");
    state[6] = 0;
    assert_eq!(
        gb.load_state(&state),
        Err(StateLoadError::OldStateVersion { found: 0 })
    );
}

#[test]
fn load_rejects_a_truncated_blob() {
    let mut gb = GameBoy::new(&test_rom(SPIN)).expect("rom should load");
    let mut state = vec![0u8; gb.state_size()];
    gb.save_state(&mut state).expect("state should serialize");
    state.truncate(state.len() - 100);
    assert_eq!(gb.load_state(&state), Err(StateLoadError::Truncated));
}

#[test]
fn load_rejects_a_state_from_another_rom() {
    let mut gb = GameBoy::new(&test_rom(SPIN)).expect("rom should load");
    let mut state = vec![0u8; gb.state_size()];
    gb.save_state(&mut state).expect("state should serialize");

    let mut other_rom = test_rom(SPIN);
    other_rom[0x014E] ^= 0xFF; // different global checksum
    let mut other = GameBoy::new(&other_rom).expect("rom should load");
    assert_eq!(other.load_state(&state), Err(StateLoadError::WrongRom));
}

#[test]
fn state_file_names_follow_the_slot_convention() {
    assert_eq!(state_file_name("tetris", 0), "tetris_0.state");
    assert_eq!(state_file_name("tetris", 3), "tetris_3.state");
}
