//! Software-rendered visualizer using `minifb`.
//!
//! Layout:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ LEAP TREE                                      GESTURE  ON   │
//! │                                                              │
//! │                      foliage cloud / tree                    │
//! │                 ornaments ■   polaroids ▢                    │
//! │                                                              │
//! │ status bar: tree state, gesture status, openness, hand, error │
//! │ key legend                                                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything is drawn into a [`Canvas`], which needs no window; the
//! [`Visualizer`] only owns the window, pushes the canvas to it, and turns
//! key presses into [`UiCommand`]s and simulated-hand updates.

use dual_formation::{ClassKind, Pose};
use glam::{Mat4, Quat, Vec3};
use minifb::{Key, KeyRepeat, Window, WindowOptions};

use crate::detector::SimHandControl;
use crate::error::AppError;
use crate::scene::{CameraRig, Scene};

// ════════════════════════════════════════════════════════════════════════════
// Layout constants
// ════════════════════════════════════════════════════════════════════════════

pub const WIN_W:     usize = 960;
pub const WIN_H:     usize = 640;
const STATUS_H:      usize = 44;
const BG_COLOR:      u32   = 0xFF05140E;
const TEXT_BG:       u32   = 0xFF0B2A1E;
const GOLD:          u32   = 0xFFD4AF37;
const ERROR_COLOR:   u32   = 0xFFFF5252;

/// Vertical field of view.
const FOV_Y_DEG:     f32   = 50.0;
const NEAR:          f32   = 0.1;
const FAR:           f32   = 200.0;

// ════════════════════════════════════════════════════════════════════════════
// Projection
// ════════════════════════════════════════════════════════════════════════════

/// A point on screen with its distance in front of the camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenPoint {
    pub x:     f32,
    pub y:     f32,
    pub depth: f32,
}

/// Perspective camera → pixel mapping for one frame.
#[derive(Clone, Copy, Debug)]
pub struct Projector {
    view_proj: Mat4,
    width:     f32,
    height:    f32,
    /// Pixels per world unit at depth 1.
    focal_px:  f32,
}

impl Projector {
    pub fn new(eye: Vec3, look_at: Vec3, width: usize, height: usize) -> Self {
        let fov    = FOV_Y_DEG.to_radians();
        let aspect = width as f32 / height.max(1) as f32;
        let proj   = Mat4::perspective_rh(fov, aspect, NEAR, FAR);
        let view   = Mat4::look_at_rh(eye, look_at, Vec3::Y);
        Projector {
            view_proj: proj * view,
            width:     width as f32,
            height:    height as f32,
            focal_px:  height as f32 * 0.5 / (fov * 0.5).tan(),
        }
    }

    /// `None` behind the camera, outside the depth range, or non-finite.
    pub fn project(&self, p: Vec3) -> Option<ScreenPoint> {
        let clip = self.view_proj * p.extend(1.0);
        if !(clip.w > NEAR && clip.w < FAR) {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        let sp = ScreenPoint {
            x:     (ndc.x * 0.5 + 0.5) * self.width,
            y:     (0.5 - ndc.y * 0.5) * self.height,
            depth: clip.w,
        };
        (sp.x.is_finite() && sp.y.is_finite()).then_some(sp)
    }

    /// On-screen size of `world` units at `depth`.
    pub fn size_px(&self, world: f32, depth: f32) -> f32 {
        world * self.focal_px / depth
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Foliage look
// ════════════════════════════════════════════════════════════════════════════

const FOLIAGE_CHAOS:  Vec3 = Vec3::new(0.2, 0.6, 0.3);
const FOLIAGE_FORMED: Vec3 = Vec3::new(0.06, 0.3, 0.15);
const GOLD_HIGHLIGHT: Vec3 = Vec3::new(0.83 * 0.3, 0.69 * 0.3, 0.22 * 0.3);

/// Needle color at `progress`, before the per-point highlight.
pub fn foliage_color(progress: f32) -> Vec3 {
    FOLIAGE_CHAOS.lerp(FOLIAGE_FORMED, progress.clamp(0.0, 1.0))
}

/// Chaos-only sway: x and z shift together, fading out as the tree forms.
pub fn foliage_sway(pos: Vec3, time: f32, progress: f32) -> Vec3 {
    let wave = (time * 2.0 + pos.y * 0.5).sin() * 0.1 * (1.0 - progress);
    Vec3::new(pos.x + wave, pos.y, pos.z + wave)
}

fn rgb(c: Vec3) -> u32 {
    let ch = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
    0xFF000000 | (ch(c.x) << 16) | (ch(c.y) << 8) | ch(c.z)
}

// ════════════════════════════════════════════════════════════════════════════
// Polaroid look
// ════════════════════════════════════════════════════════════════════════════

/// Picture fills, one per source image, repeating past the end.
const POLAROID_TINTS: [u32; 6] = [
    0xFF2E4A3E, 0xFF6B3A2E, 0xFF2E3F6B, 0xFF5E5A2A, 0xFF4A2E5E, 0xFF2A5E5A,
];

/// Inset color for the picture at `image_index`.
pub fn polaroid_tint(image_index: Option<usize>) -> u32 {
    POLAROID_TINTS[image_index.unwrap_or(0) % POLAROID_TINTS.len()]
}

/// Apparent card width as a fraction of its face-on width.
///
/// The card faces +Z at identity; turning it about Y narrows it.
pub fn card_width_factor(rotation: Quat) -> f32 {
    let normal = rotation * Vec3::Z;
    normal.z.abs().max(0.2)
}

#[derive(Clone, Copy, Debug)]
struct Card {
    half: f32,
    turn: f32,
    tint: u32,
}

// ════════════════════════════════════════════════════════════════════════════
// Canvas
// ════════════════════════════════════════════════════════════════════════════

/// ARGB framebuffer with the handful of primitives the viewer uses.
pub struct Canvas {
    buf:    Vec<u32>,
    width:  usize,
    height: usize,
    /// Scratch list of instances sorted far to near.
    sprites: Vec<(ScreenPoint, Pose, ClassKind, u32, Option<usize>)>,
    /// Scratch foliage positions.
    points:  Vec<Vec3>,
}

impl Canvas {
    pub fn new(width: usize, height: usize) -> Self {
        Canvas {
            buf: vec![BG_COLOR; width * height],
            width,
            height,
            sprites: Vec::new(),
            points:  Vec::new(),
        }
    }

    pub fn pixels(&self) -> &[u32] { &self.buf }

    pub fn pixel(&self, x: usize, y: usize) -> Option<u32> {
        (x < self.width && y < self.height).then(|| self.buf[y * self.width + x])
    }

    /// Draw one complete frame of `scene`.
    pub fn draw_scene(&mut self, scene: &Scene) {
        self.buf.fill(BG_COLOR);

        let view_h = self.status_y();
        let proj = Projector::new(scene.camera().position(), CameraRig::LOOK_AT, self.width, view_h);

        self.draw_foliage(scene, &proj, view_h);
        self.draw_instances(scene, &proj, view_h);
        self.draw_hud(scene);
    }

    // ── Foliage ───────────────────────────────────────────────────────────

    fn draw_foliage(&mut self, scene: &Scene, proj: &Projector, view_h: usize) {
        let foliage = scene.formation().foliage();
        let progress = foliage.blend();
        let time = scene.elapsed();

        let mut points = std::mem::take(&mut self.points);
        foliage.set().blend_into(progress, &mut points);

        let base = foliage_color(progress);
        let core = rgb(base + GOLD_HIGHLIGHT);
        let rim  = rgb(base + GOLD_HIGHLIGHT * 0.3);

        for &p in &points {
            let Some(sp) = proj.project(foliage_sway(p, time, progress)) else { continue };
            let size = proj.size_px(0.08, sp.depth) * (1.0 + progress * 0.5);
            let (x, y) = (sp.x as isize, sp.y as isize);
            if size < 1.5 {
                self.plot(x, y, core, view_h);
            } else {
                self.plot(x, y, core, view_h);
                self.plot(x + 1, y, rim, view_h);
                self.plot(x, y + 1, rim, view_h);
                self.plot(x + 1, y + 1, rim, view_h);
            }
        }
        self.points = points;
    }

    // ── Ornaments and polaroids ───────────────────────────────────────────

    fn draw_instances(&mut self, scene: &Scene, proj: &Projector, view_h: usize) {
        let formation = scene.formation();
        let mut sprites = std::mem::take(&mut self.sprites);
        sprites.clear();

        let groups = formation.ornaments().iter().chain(std::iter::once(formation.polaroids()));
        for group in groups {
            for (inst, pose) in group.poses() {
                if let Some(sp) = proj.project(pose.position) {
                    sprites.push((sp, pose, inst.kind, inst.color, inst.image_index));
                }
            }
        }
        // Painter's order.
        sprites.sort_by(|a, b| b.0.depth.total_cmp(&a.0.depth));

        for &(sp, pose, kind, color, image) in &sprites {
            let half = (proj.size_px(pose.scale, sp.depth) * 0.5).max(1.0);
            match kind {
                ClassKind::Polaroid => {
                    let card = Card { half, turn: card_width_factor(pose.rotation), tint: polaroid_tint(image) };
                    self.draw_polaroid(sp, card, color, view_h)
                }
                _                   => self.draw_ornament(sp, half, kind, color, view_h),
            }
        }
        self.sprites = sprites;
    }

    fn draw_ornament(&mut self, sp: ScreenPoint, half: f32, kind: ClassKind, color: u32, view_h: usize) {
        let color = 0xFF000000 | color;
        let x0 = sp.x - half;
        let y0 = sp.y - half;
        let side = half * 2.0;
        match kind {
            // Gifts get a gold ribbon cross.
            ClassKind::Gift => {
                self.fill_clipped(x0, y0, side, side, color, view_h);
                self.fill_clipped(sp.x - 0.5, y0, 1.0, side, GOLD, view_h);
                self.fill_clipped(x0, sp.y - 0.5, side, 1.0, GOLD, view_h);
            }
            ClassKind::Light => {
                self.fill_clipped(x0, y0, side, side, blend(color, 0xFFFFFFFF, 0.4), view_h);
            }
            _ => self.fill_clipped(x0, y0, side, side, color, view_h),
        }
    }

    fn draw_polaroid(&mut self, sp: ScreenPoint, card: Card, color: u32, view_h: usize) {
        // 1.2 × 1.5 card with a picture inset near the top, narrowed by its turn.
        let face_w = card.half * 1.2;
        let w = face_w * card.turn;
        let h = card.half * 1.5;
        self.fill_clipped(sp.x - w * 0.5, sp.y - h * 0.5, w, h, 0xFF000000 | color, view_h);
        let inset = face_w * 0.08;
        let pic_w = (w - inset * 2.0).max(1.0);
        let pic_h = face_w - inset * 2.0;
        self.fill_clipped(sp.x - w * 0.5 + inset, sp.y - h * 0.5 + inset, pic_w, pic_h, card.tint, view_h);
    }

    // ── HUD ───────────────────────────────────────────────────────────────

    fn status_y(&self) -> usize { self.height.saturating_sub(STATUS_H) }

    fn draw_hud(&mut self, scene: &Scene) {
        let w = self.width;
        let status_y = self.status_y();
        let g = scene.gesture();

        self.draw_label("LEAP TREE", 10, 10, GOLD);
        let mode = if scene.gesture_enabled() { "GESTURE ON" } else { "GESTURE OFF" };
        self.draw_label(mode, w.saturating_sub(4 * mode.len() + 10), 10, GOLD);

        self.fill_rect(0, status_y, w, STATUS_H, TEXT_BG);
        let status = format!(
            "TREE: {}   STATUS: {}   OPEN: {}   HAND: ({:.2}, {:.2}, {:.2})",
            scene.tree_state().label(),
            g.status.text(),
            if g.is_open { "yes" } else { "no" },
            g.hand_center.x,
            g.hand_center.y,
            g.hand_center.z,
        );
        self.draw_label(&status, 10, status_y + 6, 0xFFEEEEEE);

        if let Some(err) = &g.error {
            self.draw_label(&format!("ERROR: {}", err), 10, status_y + 18, ERROR_COLOR);
        }

        self.draw_label(
            "Space=toggle  G=gesture  H=hand  O=open  arrows=move  Q=quit",
            10, status_y + 32, 0xFF888888,
        );
    }

    // ── Primitive drawing helpers ─────────────────────────────────────────

    fn plot(&mut self, x: isize, y: isize, color: u32, max_y: usize) {
        if x >= 0 && y >= 0 && (y as usize) < max_y {
            self.set_pixel(x as usize, y as usize, color);
        }
    }

    /// Float rectangle clipped to the scene area above the status bar.
    fn fill_clipped(&mut self, x: f32, y: f32, w: f32, h: f32, color: u32, max_y: usize) {
        let x0 = x.max(0.0) as usize;
        let y0 = y.max(0.0) as usize;
        let x1 = (x + w).clamp(0.0, self.width as f32).ceil() as usize;
        let y1 = ((y + h).clamp(0.0, max_y as f32)).ceil() as usize;
        if x1 > x0 && y1 > y0 {
            self.fill_rect(x0, y0, x1 - x0, y1.min(max_y) - y0, color);
        }
    }

    fn fill_rect(&mut self, x: usize, y: usize, w: usize, h: usize, color: u32) {
        for row in y..(y + h).min(self.height) {
            for col in x..(x + w).min(self.width) {
                self.buf[row * self.width + col] = color;
            }
        }
    }

    fn set_pixel(&mut self, x: usize, y: usize, color: u32) {
        if x < self.width && y < self.height {
            self.buf[y * self.width + x] = color;
        }
    }

    /// Minimal bitmap font: 3×5 characters, 5 rows × 3 bits each.
    fn draw_label(&mut self, text: &str, x: usize, y: usize, color: u32) {
        let mut cx = x;
        for ch in text.chars() {
            let glyph = char_glyph(ch);
            for (row, &bits) in glyph.iter().enumerate() {
                for col in 0..3usize {
                    if bits & (1 << (2 - col)) != 0 {
                        self.set_pixel(cx + col, y + row, color);
                    }
                }
            }
            cx += 4; // 3 wide + 1 gap
            if cx + 4 > self.width { break; }
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Visualizer — window + input
// ════════════════════════════════════════════════════════════════════════════

/// What the viewer asked for this frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiCommand {
    ToggleManual,
    ToggleGesture,
    Quit,
}

/// Wrist travel per frame while an arrow key is held.
const SIM_STEP: f32 = 0.01;

pub struct Visualizer {
    window: Window,
    canvas: Canvas,
    sim:    SimHandControl,
}

impl Visualizer {
    pub fn new(sim: SimHandControl) -> Result<Self, AppError> {
        let mut window = Window::new(
            "Leap Tree",
            WIN_W, WIN_H,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        ).map_err(|e| AppError::Window(e.to_string()))?;

        window.limit_update_rate(Some(std::time::Duration::from_millis(16))); // ~60fps

        Ok(Visualizer { window, canvas: Canvas::new(WIN_W, WIN_H), sim })
    }

    pub fn is_open(&self) -> bool { self.window.is_open() }

    /// Read the keyboard: one-shot commands are returned, hand keys go
    /// straight to the simulated hand.
    pub fn poll_input(&mut self) -> Vec<UiCommand> {
        let mut cmds = Vec::new();
        if !self.window.is_open() {
            cmds.push(UiCommand::Quit);
            return cmds;
        }

        let one_shot = |k: Key| self.window.is_key_pressed(k, KeyRepeat::No);
        let held     = |k: Key| self.window.is_key_down(k);

        if one_shot(Key::Q) || one_shot(Key::Escape) {
            cmds.push(UiCommand::Quit);
        }
        if one_shot(Key::Space) {
            cmds.push(UiCommand::ToggleManual);
        }
        if one_shot(Key::G) {
            cmds.push(UiCommand::ToggleGesture);
        }

        let toggle_present = one_shot(Key::H);
        let open = held(Key::O);
        let dx = (held(Key::Right) as i8 - held(Key::Left) as i8) as f32 * SIM_STEP;
        let dy = (held(Key::Down) as i8 - held(Key::Up) as i8) as f32 * SIM_STEP;

        self.sim.update(|hand| {
            if toggle_present {
                hand.present = !hand.present;
            }
            hand.open = open;
            hand.wrist.x = (hand.wrist.x + dx).clamp(0.0, 1.0);
            hand.wrist.y = (hand.wrist.y + dy).clamp(0.0, 1.0);
        });

        cmds
    }

    /// Render one frame.
    pub fn render(&mut self, scene: &Scene) -> Result<(), AppError> {
        self.canvas.draw_scene(scene);
        self.window
            .update_with_buffer(self.canvas.pixels(), WIN_W, WIN_H)
            .map_err(|e| AppError::Window(e.to_string()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Minimal 3×5 bitmap font
// ────────────────────────────────────────────────────────────────────────────

fn char_glyph(c: char) -> [u8; 5] {
    match c {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b001, 0b001, 0b001],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        'a' | 'A' => [0b111, 0b101, 0b111, 0b101, 0b101],
        'b' | 'B' => [0b110, 0b101, 0b110, 0b101, 0b110],
        'c' | 'C' => [0b111, 0b100, 0b100, 0b100, 0b111],
        'd' | 'D' => [0b110, 0b101, 0b101, 0b101, 0b110],
        'e' | 'E' => [0b111, 0b100, 0b111, 0b100, 0b111],
        'f' | 'F' => [0b111, 0b100, 0b111, 0b100, 0b100],
        'g' | 'G' => [0b111, 0b100, 0b101, 0b101, 0b111],
        'h' | 'H' => [0b101, 0b101, 0b111, 0b101, 0b101],
        'i' | 'I' => [0b111, 0b010, 0b010, 0b010, 0b111],
        'j' | 'J' => [0b001, 0b001, 0b001, 0b101, 0b111],
        'k' | 'K' => [0b101, 0b101, 0b110, 0b101, 0b101],
        'l' | 'L' => [0b100, 0b100, 0b100, 0b100, 0b111],
        'm' | 'M' => [0b101, 0b111, 0b101, 0b101, 0b101],
        'n' | 'N' => [0b111, 0b101, 0b101, 0b101, 0b101],
        'o' | 'O' => [0b111, 0b101, 0b101, 0b101, 0b111],
        'p' | 'P' => [0b111, 0b101, 0b111, 0b100, 0b100],
        'q' | 'Q' => [0b111, 0b101, 0b101, 0b111, 0b001],
        'r' | 'R' => [0b110, 0b101, 0b110, 0b101, 0b101],
        's' | 'S' => [0b111, 0b100, 0b111, 0b001, 0b111],
        't' | 'T' => [0b111, 0b010, 0b010, 0b010, 0b010],
        'u' | 'U' => [0b101, 0b101, 0b101, 0b101, 0b111],
        'v' | 'V' => [0b101, 0b101, 0b101, 0b010, 0b010],
        'w' | 'W' => [0b101, 0b101, 0b101, 0b111, 0b101],
        'x' | 'X' => [0b101, 0b101, 0b010, 0b101, 0b101],
        'y' | 'Y' => [0b101, 0b101, 0b111, 0b010, 0b010],
        'z' | 'Z' => [0b111, 0b001, 0b010, 0b100, 0b111],
        '/' => [0b001, 0b001, 0b010, 0b100, 0b100],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        '_' => [0b000, 0b000, 0b000, 0b000, 0b111],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        ',' => [0b000, 0b000, 0b000, 0b010, 0b100],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        '=' => [0b000, 0b111, 0b000, 0b111, 0b000],
        '+' => [0b000, 0b010, 0b111, 0b010, 0b000],
        '!' => [0b010, 0b010, 0b010, 0b000, 0b010],
        '(' => [0b001, 0b010, 0b010, 0b010, 0b001],
        ')' => [0b100, 0b010, 0b010, 0b010, 0b100],
        '%' => [0b101, 0b001, 0b010, 0b100, 0b101],
        '>' => [0b100, 0b010, 0b001, 0b010, 0b100],
        '#' => [0b101, 0b111, 0b101, 0b111, 0b101],
        ' ' => [0b000, 0b000, 0b000, 0b000, 0b000],
        _   => [0b000, 0b000, 0b010, 0b000, 0b000], // fallback dot
    }
}

/// Alpha-blend two ARGB colors. `t` = 0.0 → all `a`, `t` = 1.0 → all `b`.
fn blend(a: u32, b: u32, t: f32) -> u32 {
    let t = t.clamp(0.0, 1.0);
    let lerp = |ca: u32, cb: u32| (ca as f32 * (1.0-t) + cb as f32 * t) as u32;
    let ar = (a >> 16) & 0xFF; let br = (b >> 16) & 0xFF;
    let ag = (a >>  8) & 0xFF; let bg = (b >>  8) & 0xFF;
    let ab =  a        & 0xFF; let bb =  b        & 0xFF;
    0xFF000000 | (lerp(ar,br) << 16) | (lerp(ag,bg) << 8) | lerp(ab,bb)
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
