//! Pluggable terrain inputs: a noise field for spawning and a biome code
//! source.

use glam::DVec2;

/// A scalar field over `(lat, lon)` with values in `[0, 1]`.
pub trait NoiseFn {
    fn sample(&self, pos: DVec2) -> f64;
}

/// Maps a position to a land-cover code that biome rules match against.
pub trait BiomeSource {
    fn code(&self, pos: DVec2) -> u16;
}

/// Smoothed lattice value noise.
#[derive(Debug, Clone, Copy)]
pub struct ValueNoise {
    pub seed: u64,
    /// Lattice cells per degree.
    pub frequency: f64,
}

impl ValueNoise {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            frequency: 2000.0,
        }
    }

    fn lattice(&self, x: i64, y: i64) -> f64 {
        let mut h = self.seed ^ (x as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        h ^= (y as u64).wrapping_mul(0xc2b2_ae3d_27d4_eb4f);
        // splitmix64 finaliser
        h = (h ^ (h >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        h = (h ^ (h >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        h ^= h >> 31;
        (h >> 11) as f64 / (1u64 << 53) as f64
    }
}

impl NoiseFn for ValueNoise {
    fn sample(&self, pos: DVec2) -> f64 {
        let p = pos * self.frequency;
        let (x0, y0) = (p.x.floor(), p.y.floor());
        let (fx, fy) = (p.x - x0, p.y - y0);
        let (sx, sy) = (smooth(fx), smooth(fy));
        let (ix, iy) = (x0 as i64, y0 as i64);

        let top = lerp(self.lattice(ix, iy), self.lattice(ix + 1, iy), sx);
        let bottom = lerp(self.lattice(ix, iy + 1), self.lattice(ix + 1, iy + 1), sx);
        lerp(top, bottom, sy)
    }
}

fn smooth(t: f64) -> f64 {
    t * t * (3.0 - 2.0 * t)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Same code everywhere.
#[derive(Debug, Clone, Copy)]
pub struct ConstantBiome(pub u16);

impl Default for ConstantBiome {
    fn default() -> Self {
        // Mixed forest in the land-cover classification the biome rules use.
        Self(22)
    }
}

impl BiomeSource for ConstantBiome {
    fn code(&self, _pos: DVec2) -> u16 {
        self.0
    }
}
