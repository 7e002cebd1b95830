//! Sphere-only scene description and ray intersection.

use crate::math::{Vec3, ZERO};

/// Surface response at an intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Material {
    Diffuse,
    Specular,
    Refractive,
}

#[derive(Debug, Clone, Copy)]
pub struct Sphere {
    pub radius: f64,
    pub position: Vec3,
    pub emission: Vec3,
    pub color: Vec3,
    pub material: Material,
    /// Largest color component, the survival probability for roulette.
    pub max_reflectivity: f64,
}

impl Sphere {
    pub fn new(radius: f64, position: Vec3, emission: Vec3, color: Vec3, material: Material) -> Self {
        Self {
            radius,
            position,
            emission,
            color,
            material,
            max_reflectivity: color.max_component(),
        }
    }

    /// Distance along the ray to the nearest intersection in front of the
    /// origin, if any. `eps` guards against self-intersection at the origin.
    pub fn intersect(&self, origin: Vec3, direction: Vec3) -> Option<f64> {
        let eps = 1e-4;
        let op = self.position - origin;
        let b = op.dot(direction);
        let discriminant = b * b - op.dot(op) + self.radius * self.radius;
        if discriminant < 0.0 {
            return None;
        }
        let discriminant = discriminant.sqrt();
        let t = b - discriminant;
        if t > eps {
            return Some(t);
        }
        let t = b + discriminant;
        if t > eps {
            return Some(t);
        }
        None
    }
}

#[derive(Debug, Clone)]
pub struct Scene {
    pub spheres: Vec<Sphere>,
}

/// Result of a scene intersection query.
#[derive(Debug, Clone, Copy)]
pub struct Hit {
    pub t: f64,
    pub sphere: usize,
}

impl Scene {
    /// The boxed test scene: five wall spheres, a mirror ball, assorted glass,
    /// a ceiling light. Walls are huge spheres whose near surface is flat at
    /// this scale.
    pub fn cornell() -> Scene {
        use Material::{Diffuse as Diff, Refractive as Refr, Specular as Spec};
        let v = Vec3::new;
        let spheres = vec![
            Sphere::new(1e5, v(1e5 + 1.0, 40.8, 81.6), ZERO, v(0.75, 0.25, 0.25), Diff), // left
            Sphere::new(1e5, v(-1e5 + 99.0, 40.8, 81.6), ZERO, v(0.25, 0.25, 0.75), Diff), // right
            Sphere::new(1e5, v(50.0, 40.8, 1e5), ZERO, v(0.75, 0.75, 0.75), Diff),       // back
            Sphere::new(1e5, v(50.0, 40.8, -1e5 + 170.0), ZERO, ZERO, Diff),             // front
            Sphere::new(1e5, v(50.0, 1e5, 81.6), ZERO, v(0.75, 0.75, 0.75), Diff),       // bottom
            Sphere::new(1e5, v(50.0, -1e5 + 81.6, 81.6), ZERO, v(0.75, 0.75, 0.75), Diff), // top
            Sphere::new(16.5, v(40.0, 16.5, 47.0), ZERO, v(0.999, 0.999, 0.999), Spec),  // mirror
            Sphere::new(16.5, v(73.0, 46.5, 88.0), ZERO, v(0.999, 0.999, 0.999), Refr),  // glass
            Sphere::new(10.0, v(15.0, 45.0, 112.0), ZERO, v(0.999, 0.999, 0.999), Diff), // white ball
            Sphere::new(15.0, v(16.0, 16.0, 130.0), ZERO, v(0.999, 0.999, 0.0), Refr),   // big yellow glass
            Sphere::new(7.5, v(40.0, 8.0, 120.0), ZERO, v(0.999, 0.999, 0.0), Refr),     // small yellow glass
            Sphere::new(8.5, v(60.0, 9.0, 110.0), ZERO, v(0.999, 0.999, 0.0), Refr),     // small yellow glass
            Sphere::new(10.0, v(80.0, 12.0, 92.0), ZERO, v(0.0, 0.999, 0.0), Diff),      // green ball
            Sphere::new(600.0, v(50.0, 681.33, 81.6), v(12.0, 12.0, 12.0), ZERO, Diff),  // light
            Sphere::new(5.0, v(50.0, 75.0, 81.6), ZERO, v(0.0, 0.682, 0.999), Diff),     // occluder
        ];
        Scene { spheres }
    }

    /// Closest sphere hit by the ray, if any.
    pub fn intersect(&self, origin: Vec3, direction: Vec3) -> Option<Hit> {
        let mut best: Option<Hit> = None;
        for (i, sphere) in self.spheres.iter().enumerate() {
            if let Some(t) = sphere.intersect(origin, direction) {
                if best.map_or(true, |h| t < h.t) {
                    best = Some(Hit { t, sphere: i });
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_on_sphere_hit_distance() {
        let s = Sphere::new(
            1.0,
            Vec3::new(0.0, 0.0, -5.0),
            ZERO,
            Vec3::new(0.5, 0.5, 0.5),
            Material::Diffuse,
        );
        let t = s.intersect(ZERO, Vec3::new(0.0, 0.0, -1.0)).unwrap();
        assert!((t - 4.0).abs() < 1e-9);
        assert!(s.intersect(ZERO, Vec3::new(0.0, 0.0, 1.0)).is_none());
    }

    #[test]
    fn roulette_probability_is_peak_color() {
        let s = Sphere::new(
            1.0,
            ZERO,
            ZERO,
            Vec3::new(0.25, 0.9, 0.1),
            Material::Diffuse,
        );
        assert_eq!(s.max_reflectivity, 0.9);
    }

    #[test]
    fn camera_ray_hits_the_box() {
        let scene = Scene::cornell();
        assert_eq!(scene.spheres.len(), 15);
        // From the camera position straight down the view axis.
        let origin = Vec3::new(50.0, 52.0, 295.6);
        let direction = Vec3::new(0.0, -0.042612, -1.0).normalized();
        let hit = scene.intersect(origin, direction).unwrap();
        assert!(hit.t > 0.0 && hit.t < 300.0);
    }
}
