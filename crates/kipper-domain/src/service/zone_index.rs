//! First-match lookup of the zone containing a point
//!
//! Sites are scanned in registry order and zones in registration order. The
//! first zone whose center is strictly closer than its radius wins, even when
//! an overlapping zone registered later is nearer. Stored data relies on this
//! ordering, so it must not become a nearest-match search.

use crate::geo::distance;
use crate::model::{Coordinate, Site, Zone};

/// Zone matched by [`locate`] together with its site
#[derive(Debug, Clone, Copy)]
pub struct ZoneHit<'a> {
    pub site: &'a Site,
    pub zone: &'a Zone,
}

pub fn locate(point: Coordinate, sites: &[Site]) -> Option<ZoneHit<'_>> {
    sites.iter().find_map(|site| {
        site.zones
            .iter()
            .find(|zone| distance(point, zone.center()) < zone.effective_radius())
            .map(|zone| ZoneHit { site, zone })
    })
}

/// First site whose own radius contains the point
pub fn site_containing(point: Coordinate, sites: &[Site]) -> Option<&Site> {
    sites
        .iter()
        .find(|site| distance(point, site.center()) < site.effective_radius())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site_with(name: &str, zones: Vec<Zone>) -> Site {
        zones
            .into_iter()
            .fold(Site::new(name, Coordinate::new(0.0, 0.0)), Site::with_zone)
    }

    #[test]
    fn test_no_sites() {
        assert!(locate(Coordinate::new(0.0, 0.0), &[]).is_none());
    }

    #[test]
    fn test_inside_zone() {
        let sites = vec![site_with("A", vec![Zone::new("Aushub", Coordinate::new(0.0, 0.0))])];
        let hit = locate(Coordinate::new(0.0001, 0.0), &sites).unwrap();
        assert_eq!(hit.zone.material, "Aushub");
        assert_eq!(hit.site.name, "A");
    }

    #[test]
    fn test_outside_zone() {
        let sites = vec![site_with("A", vec![Zone::new("Aushub", Coordinate::new(0.0, 0.0))])];
        // about 33 m north
        assert!(locate(Coordinate::new(0.0003, 0.0), &sites).is_none());
    }

    #[test]
    fn test_boundary_is_exclusive() {
        let zone = Zone::new("Aushub", Coordinate::new(0.0, 0.0));
        let point = Coordinate::new(0.0002, 0.0);
        let exact = distance(point, zone.center());
        let sites = vec![site_with("A", vec![zone.with_radius(exact)])];
        assert!(locate(point, &sites).is_none());
    }

    #[test]
    fn test_overlap_resolves_to_first_registered() {
        // Z1 is farther from the point than Z2, but registered first
        let z1 = Zone::new("Aushub", Coordinate::new(0.0, 0.0)).with_radius(40.0);
        let z2 = Zone::new("Humus", Coordinate::new(0.0002, 0.0)).with_radius(40.0);
        let sites = vec![site_with("A", vec![z1.clone()]), site_with("B", vec![z2])];

        let hit = locate(Coordinate::new(0.00018, 0.0), &sites).unwrap();
        assert_eq!(hit.zone.id, z1.id);
        assert_eq!(hit.site.name, "A");
    }

    #[test]
    fn test_zone_order_within_site() {
        let first = Zone::new("Bauschutt", Coordinate::new(0.0, 0.0));
        let second = Zone::new("Humus", Coordinate::new(0.0, 0.0));
        let sites = vec![site_with("A", vec![first.clone(), second])];
        assert_eq!(locate(Coordinate::new(0.0, 0.0), &sites).unwrap().zone.id, first.id);
    }

    #[test]
    fn test_site_containing_uses_site_radius() {
        let sites = vec![
            Site::new("Nord", Coordinate::new(0.0, 0.0)),
            Site::new("Sued", Coordinate::new(0.01, 0.0)),
        ];
        // ~111 m from the first site center, inside its 200 m radius
        let found = site_containing(Coordinate::new(0.001, 0.0), &sites).unwrap();
        assert_eq!(found.name, "NORD");
        assert!(site_containing(Coordinate::new(0.005, 0.0), &sites).is_none());
    }
}
