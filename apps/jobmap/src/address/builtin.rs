//! Offline geocoder over a small table of major Vietnamese cities.
//!
//! Used when the online geocoder is down or finds nothing, so city-level
//! searches ("hcm", "Hà Nội", "danang") keep working.

use async_trait::async_trait;

use crate::address::geocoder::{GeocodeError, GeocodeHit, Geocoder};

struct BuiltinCity {
    aliases: &'static [&'static str], // folded: lowercase, no diacritics
    display_name: &'static str,
    lat: f64,
    lon: f64,
}

const BUILTIN_CITIES: &[BuiltinCity] = &[
    BuiltinCity {
        aliases: &["ho chi minh", "hcm", "tp hcm", "saigon", "sai gon"],
        display_name: "Ho Chi Minh City, Vietnam",
        lat: 10.8231,
        lon: 106.6797,
    },
    BuiltinCity {
        aliases: &["hanoi", "ha noi"],
        display_name: "Hanoi, Vietnam",
        lat: 21.0285,
        lon: 105.8542,
    },
    BuiltinCity {
        aliases: &["da nang", "danang"],
        display_name: "Da Nang, Vietnam",
        lat: 16.0544,
        lon: 108.2022,
    },
    BuiltinCity {
        aliases: &["can tho", "cantho"],
        display_name: "Can Tho, Vietnam",
        lat: 10.0379,
        lon: 105.7869,
    },
    BuiltinCity {
        aliases: &["hai phong", "haiphong"],
        display_name: "Hai Phong, Vietnam",
        lat: 20.8449,
        lon: 106.6881,
    },
    BuiltinCity {
        aliases: &["nha trang"],
        display_name: "Nha Trang, Khanh Hoa, Vietnam",
        lat: 12.2388,
        lon: 109.1967,
    },
    BuiltinCity {
        aliases: &["hue"],
        display_name: "Hue, Vietnam",
        lat: 16.4637,
        lon: 107.5909,
    },
    BuiltinCity {
        aliases: &["da lat", "dalat"],
        display_name: "Da Lat, Lam Dong, Vietnam",
        lat: 11.9404,
        lon: 108.4583,
    },
    BuiltinCity {
        aliases: &["vung tau"],
        display_name: "Vung Tau, Ba Ria - Vung Tau, Vietnam",
        lat: 10.3460,
        lon: 107.0843,
    },
    BuiltinCity {
        aliases: &["bien hoa"],
        display_name: "Bien Hoa, Dong Nai, Vietnam",
        lat: 10.9574,
        lon: 106.8426,
    },
];

const FOLDS: &[(char, &str)] = &[
    ('a', "àáảãạăằắẳẵặâầấẩẫậ"),
    ('e', "èéẻẽẹêềếểễệ"),
    ('i', "ìíỉĩị"),
    ('o', "òóỏõọôồốổỗộơờớởỡợ"),
    ('u', "ùúủũụưừứửữự"),
    ('y', "ỳýỷỹỵ"),
    ('d', "đ"),
];

/// Lowercases, strips Vietnamese diacritics and collapses whitespace.
pub fn fold_query(query: &str) -> String {
    let folded: String = query
        .to_lowercase()
        .chars()
        .map(|c| {
            FOLDS
                .iter()
                .find(|(_, variants)| variants.contains(c))
                .map(|(base, _)| *base)
                .unwrap_or(c)
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Match quality of `query` against a city; higher is better, 0 is no match.
fn match_rank(city: &BuiltinCity, query: &str) -> u8 {
    city.aliases
        .iter()
        .map(|alias| {
            if *alias == query {
                3
            } else if query.contains(alias) {
                2
            } else if alias.starts_with(query) {
                1
            } else {
                0
            }
        })
        .max()
        .unwrap_or(0)
}

pub struct BuiltinCityGeocoder;

impl BuiltinCityGeocoder {
    pub fn lookup(query: &str) -> Vec<GeocodeHit> {
        let query = fold_query(query);
        if query.is_empty() {
            return vec![];
        }

        let mut ranked: Vec<(u8, &BuiltinCity)> = BUILTIN_CITIES
            .iter()
            .map(|city| (match_rank(city, &query), city))
            .filter(|(rank, _)| *rank > 0)
            .collect();
        // Stable: equal ranks keep table order.
        ranked.sort_by(|a, b| b.0.cmp(&a.0));

        ranked
            .into_iter()
            .map(|(_, city)| GeocodeHit {
                display_name: city.display_name.to_string(),
                latitude: city.lat,
                longitude: city.lon,
            })
            .collect()
    }
}

#[async_trait]
impl Geocoder for BuiltinCityGeocoder {
    async fn resolve(&self, query: &str) -> Result<Vec<GeocodeHit>, GeocodeError> {
        Ok(Self::lookup(query))
    }
}
