//! Pixel/timing controller.
//!
//! A four-mode per-scanline state machine driven purely by an accumulated
//! dot counter: OAM scan (mode 2), pixel transfer (mode 3), HBlank
//! (mode 0) across the 144 visible lines, then VBlank (mode 1) for lines
//! 144-153. Scanlines are composited whole at the end of mode 3 into the
//! back frame buffer; the buffers flip only at frame completion.

use crate::{FRAME_BUFFER_SIZE, SCREEN_HEIGHT, SCREEN_WIDTH};

use super::interrupts::{Interrupt, InterruptController};
use super::mmu::Mmu;

const DOTS_MODE2: u32 = 80;
const DOTS_MODE3: u32 = 172;
const DOTS_MODE0: u32 = 204;
const DOTS_PER_LINE: u32 = DOTS_MODE2 + DOTS_MODE3 + DOTS_MODE0;

const VISIBLE_LINES: u8 = SCREEN_HEIGHT as u8;
const TOTAL_LINES: u8 = 154;

/// At most this many sprites participate in one scanline; selection is in
/// OAM order and stops once the limit is reached.
const MAX_SPRITES_PER_LINE: usize = 10;

const OAM_BASE: u16 = 0xFE00;
const OAM_ENTRIES: u16 = 40;

const REG_LCDC: u16 = 0xFF40;
const REG_STAT: u16 = 0xFF41;
const REG_SCY: u16 = 0xFF42;
const REG_SCX: u16 = 0xFF43;
const REG_LY: u16 = 0xFF44;
const REG_LYC: u16 = 0xFF45;
const REG_BGP: u16 = 0xFF47;
const REG_OBP0: u16 = 0xFF48;
const REG_OBP1: u16 = 0xFF49;
const REG_WY: u16 = 0xFF4A;
const REG_WX: u16 = 0xFF4B;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Mode {
    HBlank = 0,
    VBlank = 1,
    OamScan = 2,
    Transfer = 3,
}

impl Mode {
    pub(super) fn from_bits(bits: u8) -> Mode {
        match bits & 0x03 {
            0 => Mode::HBlank,
            1 => Mode::VBlank,
            2 => Mode::OamScan,
            _ => Mode::Transfer,
        }
    }
}

/// One OAM record selected for the current scanline.
#[derive(Clone, Copy, Debug, Default)]
struct Sprite {
    y: u8,
    x: u8,
    tile: u8,
    attrs: u8,
}

pub(super) struct Ppu {
    mode: Mode,
    /// Dots accumulated within the current mode.
    dot: u32,
    line: u8,
    /// Internal window line counter; advances only on scanlines where the
    /// window actually produced pixels.
    window_line: u8,
    sprites: [Sprite; MAX_SPRITES_PER_LINE],
    sprite_count: usize,
    /// Two packed 2-bpp frame buffers; `draw_index` selects the one being
    /// drawn into, the other is presentable.
    buffers: [Box<[u8; FRAME_BUFFER_SIZE]>; 2],
    draw_index: usize,
}

impl Ppu {
    pub(super) fn new() -> Self {
        Self {
            mode: Mode::OamScan,
            dot: 0,
            line: 0,
            window_line: 0,
            sprites: [Sprite::default(); MAX_SPRITES_PER_LINE],
            sprite_count: 0,
            buffers: [
                Box::new([0u8; FRAME_BUFFER_SIZE]),
                Box::new([0u8; FRAME_BUFFER_SIZE]),
            ],
            draw_index: 0,
        }
    }

    pub(super) fn reset(&mut self) {
        self.mode = Mode::OamScan;
        self.dot = 0;
        self.line = 0;
        self.window_line = 0;
        self.sprite_count = 0;
        self.buffers[0].fill(0);
        self.buffers[1].fill(0);
        self.draw_index = 0;
    }

    /// The completed frame, never the one currently being drawn.
    pub(super) fn presented_frame(&self) -> &[u8] {
        &self.buffers[1 - self.draw_index][..]
    }

    /// Advance by `cycles` dots. Returns true when a frame completed
    /// (entry into VBlank) during this call.
    pub(super) fn tick(&mut self, cycles: u32, mmu: &mut Mmu, irq: &mut InterruptController) -> bool {
        if mmu.peek(REG_LCDC) & 0x80 == 0 {
            // Display disabled: hold line 0 / HBlank and accumulate
            // nothing.
            self.mode = Mode::HBlank;
            self.dot = 0;
            self.line = 0;
            self.window_line = 0;
            mmu.poke(REG_LY, 0);
            self.write_stat_bits(mmu);
            return false;
        }

        let mut frame_completed = false;
        self.dot += cycles;

        while self.dot >= self.mode_budget() {
            self.dot -= self.mode_budget();
            if self.advance_mode(mmu, irq) {
                frame_completed = true;
            }
        }

        frame_completed
    }

    fn mode_budget(&self) -> u32 {
        match self.mode {
            Mode::OamScan => DOTS_MODE2,
            Mode::Transfer => DOTS_MODE3,
            Mode::HBlank => DOTS_MODE0,
            Mode::VBlank => DOTS_PER_LINE,
        }
    }

    /// One state-machine transition. Returns true on frame completion.
    fn advance_mode(&mut self, mmu: &mut Mmu, irq: &mut InterruptController) -> bool {
        let stat = mmu.peek(REG_STAT);
        let mut frame_completed = false;

        match self.mode {
            Mode::OamScan => {
                self.select_sprites(mmu);
                self.mode = Mode::Transfer;
            }
            Mode::Transfer => {
                self.render_scanline(mmu);
                self.mode = Mode::HBlank;
                if stat & 0x08 != 0 {
                    irq.request(Interrupt::LcdStat);
                }
            }
            Mode::HBlank => {
                self.line += 1;
                self.check_line_compare(mmu, irq);

                if self.line == VISIBLE_LINES {
                    self.mode = Mode::VBlank;
                    // The VBlank interrupt is unconditional; the STAT
                    // VBlank source is separate and maskable.
                    irq.request(Interrupt::VBlank);
                    if stat & 0x10 != 0 {
                        irq.request(Interrupt::LcdStat);
                    }
                    // Frame boundary: flip buffers here and only here.
                    self.draw_index = 1 - self.draw_index;
                    frame_completed = true;
                    log::debug!("vblank: frame complete");
                } else {
                    self.mode = Mode::OamScan;
                    if stat & 0x20 != 0 {
                        irq.request(Interrupt::LcdStat);
                    }
                }
            }
            Mode::VBlank => {
                self.line += 1;
                if self.line == TOTAL_LINES {
                    self.line = 0;
                    self.window_line = 0;
                    self.mode = Mode::OamScan;
                    if stat & 0x20 != 0 {
                        irq.request(Interrupt::LcdStat);
                    }
                }
                self.check_line_compare(mmu, irq);
            }
        }

        mmu.poke(REG_LY, self.line);
        self.write_stat_bits(mmu);
        frame_completed
    }

    /// LYC compare, evaluated on every scanline increment. The interrupt
    /// is edge triggered: it fires on the transition into a match.
    fn check_line_compare(&self, mmu: &mut Mmu, irq: &mut InterruptController) {
        let stat = mmu.peek(REG_STAT);
        if self.line == mmu.peek(REG_LYC) && stat & 0x40 != 0 {
            irq.request(Interrupt::LcdStat);
        }
    }

    /// Mirror mode and the LYC coincidence bit into STAT bits 0-2.
    fn write_stat_bits(&self, mmu: &mut Mmu) {
        let mut stat = mmu.peek(REG_STAT) & !0x07;
        stat |= self.mode as u8;
        if self.line == mmu.peek(REG_LYC) {
            stat |= 0x04;
        }
        mmu.poke(REG_STAT, stat);
    }

    /// OAM scan: pick the first ten sprites whose Y range covers the
    /// current scanline, in OAM order.
    fn select_sprites(&mut self, mmu: &Mmu) {
        let height: u8 = if mmu.peek(REG_LCDC) & 0x04 != 0 { 16 } else { 8 };
        self.sprite_count = 0;

        for index in 0..OAM_ENTRIES {
            let base = OAM_BASE + index * 4;
            let y = mmu.peek(base);
            let screen_line = self.line.wrapping_add(16);
            if screen_line.wrapping_sub(y) >= height {
                continue;
            }

            self.sprites[self.sprite_count] = Sprite {
                y,
                x: mmu.peek(base + 1),
                tile: mmu.peek(base + 2),
                attrs: mmu.peek(base + 3),
            };
            self.sprite_count += 1;
            if self.sprite_count == MAX_SPRITES_PER_LINE {
                break;
            }
        }
    }

    /// Composite one scanline of background, window and sprites into the
    /// draw buffer.
    fn render_scanline(&mut self, mmu: &Mmu) {
        let lcdc = mmu.peek(REG_LCDC);
        let bgp = mmu.peek(REG_BGP);

        // Raw tile color indices (pre-palette) and palette-mapped shades.
        let mut colors = [0u8; SCREEN_WIDTH];
        let mut shades = [0u8; SCREEN_WIDTH];

        if lcdc & 0x01 != 0 {
            self.draw_background(mmu, lcdc, &mut colors);
            let window_drawn = self.draw_window(mmu, lcdc, &mut colors);
            if window_drawn {
                self.window_line += 1;
            }
        }
        for x in 0..SCREEN_WIDTH {
            shades[x] = (bgp >> (colors[x] * 2)) & 0x03;
        }

        if lcdc & 0x02 != 0 {
            self.draw_sprites(mmu, lcdc, &colors, &mut shades);
        }

        self.pack_row(&shades);
    }

    fn draw_background(&self, mmu: &Mmu, lcdc: u8, colors: &mut [u8; SCREEN_WIDTH]) {
        let scy = mmu.peek(REG_SCY);
        let scx = mmu.peek(REG_SCX);
        let map_base: u16 = if lcdc & 0x08 != 0 { 0x9C00 } else { 0x9800 };

        let bg_y = self.line.wrapping_add(scy);
        for x in 0..SCREEN_WIDTH {
            let bg_x = (x as u8).wrapping_add(scx);
            colors[x] = self.fetch_tile_pixel(mmu, lcdc, map_base, bg_x, bg_y);
        }
    }

    /// Window overlay. The window replaces background tiles column by
    /// column once the scanline has passed WY and the column has passed
    /// the WX trigger position. Returns whether any pixel was produced.
    fn draw_window(&self, mmu: &Mmu, lcdc: u8, colors: &mut [u8; SCREEN_WIDTH]) -> bool {
        if lcdc & 0x20 == 0 {
            return false;
        }
        let wy = mmu.peek(REG_WY);
        let wx = mmu.peek(REG_WX);
        if wy > self.line || wx > 166 {
            return false;
        }

        let map_base: u16 = if lcdc & 0x40 != 0 { 0x9C00 } else { 0x9800 };
        let start = wx.saturating_sub(7) as usize;
        for x in start..SCREEN_WIDTH {
            let win_x = (x - start) as u8;
            colors[x] = self.fetch_tile_pixel(mmu, lcdc, map_base, win_x, self.window_line);
        }
        true
    }

    /// Resolve one pixel out of a 32x32 tile map. `lcdc` bit 4 selects
    /// between the unsigned 0x8000 and signed 0x8800 tile data modes.
    fn fetch_tile_pixel(&self, mmu: &Mmu, lcdc: u8, map_base: u16, x: u8, y: u8) -> u8 {
        let map_addr = map_base + (y as u16 / 8) * 32 + x as u16 / 8;
        let tile_index = mmu.peek(map_addr);

        let tile_addr = if lcdc & 0x10 != 0 {
            0x8000 + tile_index as u16 * 16
        } else {
            (0x9000i32 + (tile_index as i8 as i32) * 16) as u16
        };

        let row_addr = tile_addr + (y as u16 & 7) * 2;
        let lo = mmu.peek(row_addr);
        let hi = mmu.peek(row_addr + 1);
        let bit = 7 - (x & 7);
        ((hi >> bit) & 1) << 1 | ((lo >> bit) & 1)
    }

    /// Overlay the selected sprites.
    ///
    /// Priority is deterministic: a lower X coordinate wins between
    /// sprites, OAM order breaks ties; the per-sprite priority bit hides
    /// the sprite behind non-zero background colors. Drawing runs from
    /// the lowest-priority sprite to the highest so that later writes are
    /// the winning ones.
    fn draw_sprites(
        &self,
        mmu: &Mmu,
        lcdc: u8,
        bg_colors: &[u8; SCREEN_WIDTH],
        shades: &mut [u8; SCREEN_WIDTH],
    ) {
        let height: u8 = if lcdc & 0x04 != 0 { 16 } else { 8 };

        // Stable sort by X keeps OAM order within equal X coordinates.
        let mut order: Vec<usize> = (0..self.sprite_count).collect();
        order.sort_by_key(|&i| self.sprites[i].x);

        for &index in order.iter().rev() {
            let sprite = self.sprites[index];
            let flip_x = sprite.attrs & 0x20 != 0;
            let flip_y = sprite.attrs & 0x40 != 0;
            let behind_bg = sprite.attrs & 0x80 != 0;
            let palette = if sprite.attrs & 0x10 != 0 {
                mmu.peek(REG_OBP1)
            } else {
                mmu.peek(REG_OBP0)
            };

            let mut row = self.line.wrapping_add(16).wrapping_sub(sprite.y);
            if flip_y {
                row = height - 1 - row;
            }
            let mut tile = sprite.tile;
            if height == 16 {
                tile &= 0xFE;
                if row >= 8 {
                    tile += 1;
                    row -= 8;
                }
            }

            let row_addr = 0x8000 + tile as u16 * 16 + row as u16 * 2;
            let lo = mmu.peek(row_addr);
            let hi = mmu.peek(row_addr + 1);

            for px in 0u8..8 {
                let screen_x = sprite.x.wrapping_add(px).wrapping_sub(8);
                if screen_x as usize >= SCREEN_WIDTH {
                    continue;
                }

                let bit = if flip_x { px } else { 7 - px };
                let color = ((hi >> bit) & 1) << 1 | ((lo >> bit) & 1);
                if color == 0 {
                    // Color 0 is transparent for sprites.
                    continue;
                }
                if behind_bg && bg_colors[screen_x as usize] != 0 {
                    continue;
                }
                shades[screen_x as usize] = (palette >> (color * 2)) & 0x03;
            }
        }
    }

    /// Pack one row of shades into the draw buffer, most significant
    /// pixel pair first.
    fn pack_row(&mut self, shades: &[u8; SCREEN_WIDTH]) {
        let row_base = self.line as usize * SCREEN_WIDTH / 4;
        let buffer = &mut self.buffers[self.draw_index];
        for (chunk, pixels) in shades.chunks_exact(4).enumerate() {
            buffer[row_base + chunk] =
                pixels[0] << 6 | pixels[1] << 4 | pixels[2] << 2 | pixels[3];
        }
    }

    pub(super) fn mode(&self) -> Mode {
        self.mode
    }

    pub(super) fn line(&self) -> u8 {
        self.line
    }

    pub(super) fn snapshot(&self) -> (u8, u32, u8, u8) {
        (self.mode as u8, self.dot, self.line, self.window_line)
    }

    pub(super) fn restore(&mut self, mode: u8, dot: u32, line: u8, window_line: u8, mmu: &mut Mmu) {
        self.mode = Mode::from_bits(mode);
        self.dot = dot;
        self.line = line;
        self.window_line = window_line;
        self.sprite_count = 0;
        mmu.poke(REG_LY, line);
        self.write_stat_bits(mmu);
    }
}
