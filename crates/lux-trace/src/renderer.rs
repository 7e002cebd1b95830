//! The Monte-Carlo path-tracing kernel: one work item is one pixel.
//!
//! Each pixel carries its own PRNG, seeded from the run seed and the global
//! pixel index, so a pixel's value depends only on the renderer construction
//! and the index. Who computes it, and in what order, cannot show up in the
//! image.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use lux_core::kernel::Kernel;
use lux_core::types::Rgb;

use crate::math::{Vec3, ZERO};
use crate::scene::{Material, Scene};

/// Past this depth, Russian roulette decides whether a path survives.
const KILL_DEPTH: u32 = 7;
/// Below this depth dielectric hits trace both branches; past it, one
/// branch is sampled.
const SPLIT_DEPTH: u32 = 4;
/// Field-of-view constant.
const FOV: f64 = 0.5135;

const SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

pub struct Renderer {
    scene: Scene,
    width: u32,
    height: u32,
    samples: u32,
    seed: u64,
    cam_position: Vec3,
    cam_direction: Vec3,
    cx: Vec3,
    cy: Vec3,
}

impl Renderer {
    pub fn new(scene: Scene, width: u32, height: u32, samples: u32, seed: u64) -> Self {
        let cam_position = Vec3::new(50.0, 52.0, 295.6);
        let cam_direction = Vec3::new(0.0, -0.042612, -1.0).normalized();
        let cx = Vec3::new(f64::from(width) * FOV / f64::from(height), 0.0, 0.0);
        let cy = cx.cross(cam_direction).normalized() * FOV;
        Self {
            scene,
            width,
            height,
            samples,
            seed,
            cam_position,
            cam_direction,
            cx,
            cy,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Total pixels, the size of the work grid.
    pub fn item_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Incoming radiance along the ray.
    fn radiance(&self, origin: Vec3, direction: Vec3, depth: u32, rng: &mut SmallRng) -> Vec3 {
        let Some(hit) = self.scene.intersect(origin, direction) else {
            return ZERO;
        };
        let obj = &self.scene.spheres[hit.sphere];

        let x = origin + direction * hit.t;
        let n = (x - obj.position).normalized();
        let nl = if n.dot(direction) > 0.0 { -n } else { n };

        let mut f = obj.color;
        let depth = depth + 1;
        if depth > KILL_DEPTH {
            let p = obj.max_reflectivity;
            if rng.gen::<f64>() < p {
                f = f * (1.0 / p);
            } else {
                return obj.emission;
            }
        }

        match obj.material {
            Material::Diffuse => {
                // Cosine-weighted direction in the hemisphere around nl.
                let r1 = 2.0 * std::f64::consts::PI * rng.gen::<f64>();
                let r2: f64 = rng.gen();
                let r2s = r2.sqrt();
                let w = nl;
                let up = if w.x.abs() > 0.1 {
                    Vec3::new(0.0, 1.0, 0.0)
                } else {
                    Vec3::new(1.0, 0.0, 0.0)
                };
                let u = up.cross(w).normalized();
                let v = w.cross(u);
                let d = (u * (r1.cos() * r2s) + v * (r1.sin() * r2s) + w * (1.0 - r2).sqrt())
                    .normalized();
                f.hadamard(self.radiance(x, d, depth, rng)) + obj.emission
            }
            Material::Specular => {
                let reflected = direction - n * (2.0 * n.dot(direction));
                f.hadamard(self.radiance(x, reflected, depth, rng)) + obj.emission
            }
            Material::Refractive => {
                let reflected = direction - n * (2.0 * n.dot(direction));
                let into = n.dot(nl) > 0.0;
                let nc = 1.0;
                let nt = 1.5;
                let nnt = if into { nc / nt } else { nt / nc };
                let ddn = direction.dot(nl);
                let cos2t = 1.0 - nnt * nnt * (1.0 - ddn * ddn);
                if cos2t < 0.0 {
                    // Total internal reflection.
                    return f.hadamard(self.radiance(x, reflected, depth, rng)) + obj.emission;
                }
                let sign = if into { 1.0 } else { -1.0 };
                let tdir = direction * nnt - n * (sign * (ddn * nnt + cos2t.sqrt()));

                // Schlick's approximation of the Fresnel reflectance.
                let a = nt - nc;
                let b = nt + nc;
                let r0 = a * a / (b * b);
                let c = 1.0 - if into { -ddn } else { tdir.dot(n) };
                let re = r0 + (1.0 - r0) * c * c * c * c * c;
                let tr = 1.0 - re;

                let rec = if depth > SPLIT_DEPTH {
                    let p = 0.25 + 0.5 * re;
                    if rng.gen::<f64>() < p {
                        self.radiance(x, reflected, depth, rng) * (re / p)
                    } else {
                        self.radiance(x, tdir, depth, rng) * (tr / (1.0 - p))
                    }
                } else {
                    self.radiance(x, reflected, depth, rng) * re
                        + self.radiance(x, tdir, depth, rng) * tr
                };
                f.hadamard(rec) + obj.emission
            }
        }
    }
}

impl Kernel for Renderer {
    /// Renders pixel `item` of the grid: 2x2 subpixels, each averaging
    /// `samples` tent-filtered camera rays, each subpixel clamped before the
    /// final quarter-weighted sum.
    fn compute(&self, item: u64) -> Rgb {
        let w = f64::from(self.width);
        let h = f64::from(self.height);
        let i = (item / u64::from(self.width)) as f64;
        let j = (item % u64::from(self.width)) as f64;

        let mut rng = SmallRng::seed_from_u64(self.seed ^ item.wrapping_mul(SEED_MIX));
        let mut pixel = ZERO;
        for sub_i in 0..2 {
            for sub_j in 0..2 {
                let mut subpixel = ZERO;
                for _ in 0..self.samples {
                    // Tent filter over the subpixel footprint.
                    let r1 = 2.0 * rng.gen::<f64>();
                    let dx = if r1 < 1.0 { r1.sqrt() - 1.0 } else { 1.0 - (2.0 - r1).sqrt() };
                    let r2 = 2.0 * rng.gen::<f64>();
                    let dy = if r2 < 1.0 { r2.sqrt() - 1.0 } else { 1.0 - (2.0 - r2).sqrt() };

                    let direction = (self.cam_direction
                        + self.cy * (((f64::from(sub_i) + 0.5 + dy) / 2.0 + i) / h - 0.5)
                        + self.cx * (((f64::from(sub_j) + 0.5 + dx) / 2.0 + j) / w - 0.5))
                        .normalized();
                    let origin = self.cam_position + direction * 140.0;

                    subpixel +=
                        self.radiance(origin, direction, 0, &mut rng) * (1.0 / f64::from(self.samples));
                }
                let clamped = Rgb::new(subpixel.x, subpixel.y, subpixel.z).clamped();
                pixel += Vec3::new(clamped.r, clamped.g, clamped.b) * 0.25;
            }
        }
        Rgb::new(pixel.x, pixel.y, pixel.z)
    }
}
