use std::sync::atomic::{AtomicU32, Ordering};

/// A positive unsigned integer naming a segment identity. 0 is reserved for
/// "unobserved / no label".
pub type Label = u32;

/// Non-negative evidence counter. A voxel at confidence 0 is up for grabs by
/// any incoming label.
pub type LabelConfidence = u32;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Weighted blend of two colors. Zero total weight yields the default.
    pub fn blend(first: Color, first_weight: f32, second: Color, second_weight: f32) -> Color {
        let total = first_weight + second_weight;
        if total <= 0.0 {
            return Color::default();
        }
        let mix = |a: u8, b: u8| -> u8 {
            let v = (a as f32 * first_weight + b as f32 * second_weight) / total;
            v.round().clamp(0.0, 255.0) as u8
        };
        Color {
            r: mix(first.r, second.r),
            g: mix(first.g, second.g),
            b: mix(first.b, second.b),
            a: mix(first.a, second.a),
        }
    }

    #[inline]
    pub fn pack(self) -> u32 {
        (self.r as u32) | (self.g as u32) << 8 | (self.b as u32) << 16 | (self.a as u32) << 24
    }

    #[inline]
    pub fn unpack(word: u32) -> Color {
        Color {
            r: (word & 0xFF) as u8,
            g: (word >> 8 & 0xFF) as u8,
            b: (word >> 16 & 0xFF) as u8,
            a: (word >> 24 & 0xFF) as u8,
        }
    }
}

/// Per-voxel label plus accumulated evidence for it.
///
/// Fields are atomics so blocks can be shared between integration workers;
/// the compound read-modify-write in the update rule is serialized by the
/// voxel's stripe lock, so relaxed loads and stores suffice.
pub struct LabelVoxel {
    label: AtomicU32,
    confidence: AtomicU32,
}

impl LabelVoxel {
    #[inline]
    pub fn label(&self) -> Label {
        self.label.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn confidence(&self) -> LabelConfidence {
        self.confidence.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_label(&self, label: Label) {
        self.label.store(label, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn set_confidence(&self, confidence: LabelConfidence) {
        self.confidence.store(confidence, Ordering::Relaxed);
    }
}

impl Default for LabelVoxel {
    fn default() -> Self {
        Self {
            label: AtomicU32::new(0),
            confidence: AtomicU32::new(0),
        }
    }
}

/// Distance voxel: signed distance to the nearest surface (clamped to the
/// truncation band), fusion weight, and a blended color packed RGBA8.
///
/// f32 payloads are stored bit-cast in atomic words, same sharing rules as
/// [`LabelVoxel`].
pub struct TsdfVoxel {
    distance: AtomicU32,
    weight: AtomicU32,
    color: AtomicU32,
}

impl TsdfVoxel {
    #[inline]
    pub fn distance(&self) -> f32 {
        f32::from_bits(self.distance.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn weight(&self) -> f32 {
        f32::from_bits(self.weight.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn color(&self) -> Color {
        Color::unpack(self.color.load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn set_distance(&self, distance: f32) {
        self.distance.store(distance.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn set_weight(&self, weight: f32) {
        self.weight.store(weight.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn set_color(&self, color: Color) {
        self.color.store(color.pack(), Ordering::Relaxed);
    }
}

impl Default for TsdfVoxel {
    fn default() -> Self {
        Self {
            distance: AtomicU32::new(0.0f32.to_bits()),
            weight: AtomicU32::new(0.0f32.to_bits()),
            color: AtomicU32::new(0),
        }
    }
}
