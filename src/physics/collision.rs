//! Narrow-phase contact response between point masses and rods of different bodies.
//! Contacts are perfectly inelastic: overlap is removed and the closing velocity
//! along the contact normal is cancelled, shared by inverse mass.

use glam::DVec2;

use super::{Body, PointMass};

/// Radius-sum overlap test and response. Returns whether the points touched.
pub fn point_point(a: &mut PointMass, b: &mut PointMass) -> bool {
    let delta = b.pos - a.pos;
    let dist = delta.length();
    let overlap = a.radius + b.radius - dist;
    if overlap <= 0.0 {
        return false;
    }
    let normal = if dist > f64::EPSILON {
        delta / dist
    } else {
        DVec2::X
    };

    let (wa, wb) = (a.inverse_mass(), b.inverse_mass());
    let total = wa + wb;
    if total <= 0.0 {
        return true;
    }
    a.pos -= normal * (overlap * wa / total);
    b.pos += normal * (overlap * wb / total);

    let closing = (b.vel - a.vel).dot(normal);
    if closing < 0.0 {
        a.vel += normal * (closing * wa / total);
        b.vel -= normal * (closing * wb / total);
    }
    true
}

/// Mass of a rod with end masses `m0`, `m1` as felt at parameter `t` along it.
pub fn effective_mass(m0: f64, m1: f64, t: f64) -> f64 {
    let denom = m0 * t * t + m1 * (1.0 - t) * (1.0 - t);
    if denom <= f64::EPSILON {
        return m0.max(m1);
    }
    m0 * m1 / denom
}

/// Point against the segment `end0`-`end1`. The hit test uses the point's radius
/// only; the rod has no thickness.
pub fn point_rod(p: &mut PointMass, end0: &mut PointMass, end1: &mut PointMass) -> bool {
    let axis = end1.pos - end0.pos;
    let len_sq = axis.length_squared();
    if len_sq <= f64::EPSILON {
        return false;
    }
    let t = (p.pos - end0.pos).dot(axis) / len_sq;
    if !(0.0..=1.0).contains(&t) {
        return false;
    }
    let contact = end0.pos + axis * t;
    let offset = p.pos - contact;
    let dist = offset.length();
    if dist >= p.radius {
        return false;
    }
    let normal = if dist > f64::EPSILON {
        offset / dist
    } else {
        axis.perp().normalize_or_zero()
    };
    let depth = p.radius - dist;

    let rod_mass = effective_mass(end0.mass, end1.mass, t);
    let wp = p.inverse_mass();
    let wr = if rod_mass > 0.0 { 1.0 / rod_mass } else { 0.0 };
    let total = wp + wr;
    if total <= 0.0 {
        return true;
    }

    // Moving the ends by `s * (1-t) * m_eff / m0` and `s * t * m_eff / m1` moves
    // the contact point by exactly `s`.
    let share0 = (1.0 - t) * rod_mass * end0.inverse_mass();
    let share1 = t * rod_mass * end1.inverse_mass();

    p.pos += normal * (depth * wp / total);
    let rod_shift = normal * (depth * wr / total);
    end0.pos -= rod_shift * share0;
    end1.pos -= rod_shift * share1;

    let contact_vel = end0.vel * (1.0 - t) + end1.vel * t;
    let closing = (p.vel - contact_vel).dot(normal);
    if closing < 0.0 {
        p.vel -= normal * (closing * wp / total);
        let rod_dv = normal * (closing * wr / total);
        end0.vel += rod_dv * share0;
        end1.vel += rod_dv * share1;
    }
    true
}

/// Points of each body that touched the other body.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Contacts {
    pub a: Vec<usize>,
    pub b: Vec<usize>,
}

impl Contacts {
    pub fn is_empty(&self) -> bool {
        self.a.is_empty() && self.b.is_empty()
    }
}

/// Narrow phase between two distinct bodies: every point pair, then every point
/// of one body against every rod of the other.
pub fn bodies(a: &mut Body, b: &mut Body) -> Contacts {
    let mut contacts = Contacts::default();
    let (na, nb) = (a.points().len(), b.points().len());

    for i in 0..na {
        for j in 0..nb {
            if point_point(&mut a.points_mut()[i], &mut b.points_mut()[j]) {
                contacts.a.push(i);
                contacts.b.push(j);
            }
        }
    }

    for i in 0..na {
        for r in 0..b.rods().len() {
            let Some((e0, e1)) = b.rod_ends_mut(r) else {
                continue;
            };
            if point_rod(&mut a.points_mut()[i], e0, e1) {
                contacts.a.push(i);
            }
        }
    }
    for j in 0..nb {
        for r in 0..a.rods().len() {
            let Some((e0, e1)) = a.rod_ends_mut(r) else {
                continue;
            };
            if point_rod(&mut b.points_mut()[j], e0, e1) {
                contacts.b.push(j);
            }
        }
    }

    contacts.a.sort_unstable();
    contacts.a.dedup();
    contacts.b.sort_unstable();
    contacts.b.dedup();
    contacts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separated_points_do_not_touch() {
        let mut a = PointMass::new(DVec2::ZERO, 1.0, 2.0);
        let mut b = PointMass::new(DVec2::new(5.0, 0.0), 1.0, 2.0);
        assert!(!point_point(&mut a, &mut b));
        assert_eq!(a.pos, DVec2::ZERO);
    }

    #[test]
    fn overlap_is_split_by_inverse_mass() {
        let mut light = PointMass::new(DVec2::ZERO, 1.0, 2.0);
        let mut heavy = PointMass::new(DVec2::new(3.0, 0.0), 3.0, 2.0);
        light.vel = DVec2::new(4.0, 0.0);
        assert!(point_point(&mut light, &mut heavy));
        // overlap 1: light moves 0.75, heavy 0.25
        assert!((light.pos.x + 0.75).abs() < 1e-12);
        assert!((heavy.pos.x - 3.25).abs() < 1e-12);
        // closing velocity removed, momentum kept
        assert!((light.vel.x - heavy.vel.x).abs() < 1e-12);
        assert!((light.vel.x * 1.0 + heavy.vel.x * 3.0 - 4.0).abs() < 1e-12);
    }

    #[test]
    fn effective_mass_at_ends_and_middle() {
        assert!((effective_mass(2.0, 3.0, 0.0) - 2.0).abs() < 1e-12);
        assert!((effective_mass(2.0, 3.0, 1.0) - 3.0).abs() < 1e-12);
        assert!((effective_mass(1.0, 1.0, 0.5) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn point_pushes_rod_middle() {
        let mut p = PointMass::new(DVec2::new(5.0, 1.0), 2.0, 2.0);
        let mut e0 = PointMass::new(DVec2::ZERO, 1.0, 1.0);
        let mut e1 = PointMass::new(DVec2::new(10.0, 0.0), 1.0, 1.0);
        assert!(point_rod(&mut p, &mut e0, &mut e1));
        // effective rod mass at t = 0.5 is 2, equal to the point: each takes half of depth 1
        assert!((p.pos.y - 1.5).abs() < 1e-12);
        assert!((e0.pos.y + 0.5).abs() < 1e-12);
        assert!((e1.pos.y + 0.5).abs() < 1e-12);
    }

    #[test]
    fn point_beyond_rod_end_is_ignored() {
        let mut p = PointMass::new(DVec2::new(12.0, 0.5), 1.0, 2.0);
        let mut e0 = PointMass::new(DVec2::ZERO, 1.0, 1.0);
        let mut e1 = PointMass::new(DVec2::new(10.0, 0.0), 1.0, 1.0);
        assert!(!point_rod(&mut p, &mut e0, &mut e1));
    }

    #[test]
    fn overlapping_bodies_report_contacts() {
        use crate::physics::BodyBuilder;

        let stick = |x: f64| {
            let mut b = BodyBuilder::new();
            let p0 = b.add_point(DVec2::new(x, 0.0), 1.0, 2.0);
            let p1 = b.add_point(DVec2::new(x, 10.0), 1.0, 2.0);
            b.add_rod(Some(p0), Some(p1), 10.0, 10.0);
            b.build().unwrap()
        };
        let mut left = stick(0.0);
        let mut right = stick(3.0);
        let contacts = bodies(&mut left, &mut right);
        assert_eq!(contacts.a, vec![0, 1]);
        assert_eq!(contacts.b, vec![0, 1]);
        assert!(left.points()[0].pos.x < 0.0);
        assert!(right.points()[0].pos.x > 3.0);

        let mut far = stick(50.0);
        assert!(bodies(&mut left, &mut far).is_empty());
    }
}
