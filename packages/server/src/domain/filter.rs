//! Search criteria and the mutual compatibility predicate.
//!
//! Location-scope filters (country, city, distance) are satisfied when the
//! candidate is located inside the requested scope, or when the candidate set
//! no constraint of the same kind. Profile filters (age, language, gender)
//! check the candidate's self-declared profile; an undeclared field never
//! satisfies a filter on it.

/// Mean Earth radius in kilometres.
const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Client-reported geolocation. Advisory only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationHint {
    pub country: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl LocationHint {
    /// Bucket key used by presence counting (upper-cased country).
    pub fn country_key(&self) -> Option<String> {
        self.country
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_uppercase)
    }

    fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon))
                if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) =>
            {
                Some((lat, lon))
            }
            _ => None,
        }
    }
}

/// Inclusive age range. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgeRange {
    pub min: Option<u8>,
    pub max: Option<u8>,
}

impl AgeRange {
    pub fn contains(&self, age: u8) -> bool {
        self.min.is_none_or(|min| age >= min) && self.max.is_none_or(|max| age <= max)
    }

    fn is_open(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// What a client declares about itself when searching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelfProfile {
    pub age: Option<u8>,
    pub language: Option<String>,
    pub gender: Option<String>,
}

/// Filters a searcher applies to candidates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    pub country: Option<String>,
    pub city: Option<String>,
    pub max_distance_km: Option<f64>,
    pub age_range: Option<AgeRange>,
    pub language: Option<String>,
    pub gender: Option<String>,
}

impl SearchFilters {
    pub fn country_constraint(&self) -> Option<String> {
        constraint(&self.country)
    }

    pub fn city_constraint(&self) -> Option<String> {
        constraint(&self.city)
    }

    pub fn distance_constraint(&self) -> Option<f64> {
        self.max_distance_km.filter(|km| km.is_finite() && *km > 0.0)
    }

    fn age_constraint(&self) -> Option<AgeRange> {
        self.age_range.filter(|range| !range.is_open())
    }

    /// Whether any filter beyond country is set. Those need the advanced tier.
    pub fn has_advanced(&self) -> bool {
        self.city_constraint().is_some()
            || self.distance_constraint().is_some()
            || self.age_constraint().is_some()
            || constraint(&self.language).is_some()
            || constraint(&self.gender).is_some()
    }

    /// Basic-tier view of these filters: country only.
    pub fn without_advanced(&self) -> Self {
        Self {
            country: self.country.clone(),
            ..Self::default()
        }
    }
}

/// Everything the matchmaker knows about one searcher.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchCriteria {
    pub filters: SearchFilters,
    pub profile: SelfProfile,
    pub location: Option<LocationHint>,
}

impl SearchCriteria {
    /// Whether this searcher's filters accept `candidate`.
    pub fn accepts(&self, candidate: &SearchCriteria) -> bool {
        self.accepts_country(candidate)
            && self.accepts_city(candidate)
            && self.accepts_distance(candidate)
            && self.accepts_age(candidate)
            && matches_declared(&self.filters.language, &candidate.profile.language)
            && matches_declared(&self.filters.gender, &candidate.profile.gender)
    }

    fn accepts_country(&self, candidate: &SearchCriteria) -> bool {
        let Some(wanted) = self.filters.country_constraint() else {
            return true;
        };
        if candidate.filters.country_constraint().is_none() {
            return true;
        }
        location_field(&candidate.location, |l| &l.country).as_deref() == Some(wanted.as_str())
    }

    fn accepts_city(&self, candidate: &SearchCriteria) -> bool {
        let Some(wanted) = self.filters.city_constraint() else {
            return true;
        };
        if candidate.filters.city_constraint().is_none() {
            return true;
        }
        location_field(&candidate.location, |l| &l.city).as_deref() == Some(wanted.as_str())
    }

    fn accepts_distance(&self, candidate: &SearchCriteria) -> bool {
        let Some(radius_km) = self.filters.distance_constraint() else {
            return true;
        };
        // Cannot be evaluated without our own position.
        let Some(origin) = self.location.as_ref().and_then(LocationHint::coordinates) else {
            return true;
        };
        if candidate.filters.distance_constraint().is_none() {
            return true;
        }
        candidate
            .location
            .as_ref()
            .and_then(LocationHint::coordinates)
            .is_some_and(|point| haversine_km(origin, point) <= radius_km)
    }

    fn accepts_age(&self, candidate: &SearchCriteria) -> bool {
        match self.filters.age_constraint() {
            Some(range) => candidate.profile.age.is_some_and(|age| range.contains(age)),
            None => true,
        }
    }
}

/// Both directions must accept: A's filters accept B and B's filters accept A.
pub fn is_mutually_compatible(a: &SearchCriteria, b: &SearchCriteria) -> bool {
    a.accepts(b) && b.accepts(a)
}

/// Normalized filter value, or `None` when it imposes no constraint.
fn constraint(value: &Option<String>) -> Option<String> {
    let normalized = value.as_deref()?.trim().to_lowercase();
    match normalized.as_str() {
        "" | "any" | "all" => None,
        _ => Some(normalized),
    }
}

fn location_field(
    location: &Option<LocationHint>,
    field: impl Fn(&LocationHint) -> &Option<String>,
) -> Option<String> {
    location
        .as_ref()
        .and_then(|l| field(l).as_deref())
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

fn matches_declared(filter: &Option<String>, declared: &Option<String>) -> bool {
    match constraint(filter) {
        Some(wanted) => declared
            .as_deref()
            .is_some_and(|d| d.trim().to_lowercase() == wanted),
        None => true,
    }
}

fn haversine_km((lat1, lon1): (f64, f64), (lat2, lon2): (f64, f64)) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}
