use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::form_urlencoded;
use utoipa::ToSchema;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 20;
pub const MAX_LIMIT: u64 = 100;
/// Pages beyond this are clamped so page and offset always fit a Postgres bigint.
pub const MAX_PAGE: u64 = i64::MAX as u64;

#[derive(Debug, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl Pagination {
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1).saturating_mul(per_page);
        (page, per_page, offset)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OrderListQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub status: Option<String>,
    pub sort_order: Option<SortOrder>,
}

/// Raw query string as key -> values.
///
/// Repeated keys (`color=red&color=blue`) and bracket keys (`color[]=red`)
/// both accumulate into the same list, so every key is always an array.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueryParams(BTreeMap<String, Vec<String>>);

impl QueryParams {
    pub fn parse(raw: &str) -> Self {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in form_urlencoded::parse(raw.trim_start_matches('?').as_bytes()) {
            let key = key.strip_suffix("[]").unwrap_or(&key).to_string();
            map.entry(key).or_default().push(value.into_owned());
        }
        Self(map)
    }

    /// All non-blank values for `key`, trimmed.
    pub fn all(&self, key: &str) -> Vec<String> {
        self.0
            .get(key)
            .map(|values| {
                values
                    .iter()
                    .map(|v| v.trim())
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Values for `key` exactly as decoded, blanks and whitespace included.
    pub fn raw(&self, key: &str) -> impl Iterator<Item = &str> {
        self.0.get(key).into_iter().flatten().map(String::as_str)
    }

    /// First non-blank value for `key`.
    pub fn first(&self, key: &str) -> Option<String> {
        self.all(key).into_iter().next()
    }

    /// First value for `key` that parses as `T`; the rest are ignored.
    pub fn first_parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.all(key).iter().find_map(|v| v.parse::<T>().ok())
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in iter {
            let key: String = key.into();
            let key = key.strip_suffix("[]").map(str::to_string).unwrap_or(key);
            map.entry(key).or_default().push(value.into());
        }
        Self(map)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Featured,
    Latest,
    PriceAsc,
    PriceDesc,
}

impl SortKey {
    pub fn from_alias(value: &str) -> Self {
        match value {
            "newest" | "latest" => SortKey::Latest,
            "price_asc" | "price-low" => SortKey::PriceAsc,
            "price_desc" | "price-high" => SortKey::PriceDesc,
            _ => SortKey::Featured,
        }
    }
}

/// Normalized catalog filter. Prices are in minor units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ProductFilters {
    pub search: Option<String>,
    pub gender: Vec<String>,
    pub brand: Vec<String>,
    pub category: Vec<String>,
    pub color: Vec<String>,
    pub size: Vec<String>,
    pub price_min: Option<i64>,
    pub price_max: Option<i64>,
    pub sort: SortKey,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl ProductFilters {
    pub fn from_query(raw: &str) -> Self {
        Self::from_params(&QueryParams::parse(raw))
    }

    pub fn from_params(params: &QueryParams) -> Self {
        let mut filters = ProductFilters {
            search: params.first("search"),
            gender: params.all("gender"),
            brand: params.all("brand"),
            category: params.all("category"),
            color: params.all("color"),
            size: params.all("size"),
            price_min: params
                .first_parsed::<f64>("priceMin")
                .and_then(dollars_to_cents),
            price_max: params
                .first_parsed::<f64>("priceMax")
                .and_then(dollars_to_cents),
            sort: params
                .first("sort")
                .or_else(|| params.first("sortBy"))
                .map(|s| SortKey::from_alias(&s))
                .unwrap_or_default(),
            page: params
                .first_parsed::<u64>("page")
                .filter(|p| *p > 0)
                .map(|p| p.min(MAX_PAGE)),
            limit: params
                .first_parsed::<u64>("limit")
                .filter(|l| *l > 0)
                .map(|l| l.min(MAX_LIMIT)),
        };

        if filters.price_min.is_none() && filters.price_max.is_none() {
            let bounds = PriceBounds::from_tokens(params.raw("price"));
            filters.price_min = bounds.min;
            filters.price_max = bounds.max;
        }

        filters
    }

    pub fn page(&self) -> u64 {
        self.page.unwrap_or(DEFAULT_PAGE)
    }

    pub fn limit(&self) -> u64 {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }

    /// Saturates at `i64::MAX`, which simply yields an empty page.
    pub fn offset(&self) -> u64 {
        (self.page() - 1)
            .saturating_mul(self.limit())
            .min(MAX_PAGE)
    }

    pub fn has_variant_constraints(&self) -> bool {
        !self.color.is_empty()
            || !self.size.is_empty()
            || self.price_min.is_some()
            || self.price_max.is_some()
    }
}

/// Widest bounds enclosing every supplied price range token.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PriceBounds {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl PriceBounds {
    /// Folds tokens such as `"25-50"` and `"150+"` (major units).
    /// An open-ended token removes the upper bound; malformed tokens are skipped.
    ///
    /// Tokens are expected untrimmed: an unescaped `150+` in a query string
    /// form-decodes to `"150 "`, and the trailing space still marks it open-ended.
    pub fn from_tokens<'a, I: IntoIterator<Item = &'a str>>(tokens: I) -> Self {
        let mut min: Option<i64> = None;
        let mut max: Option<i64> = None;
        let mut open_ended = false;

        for raw in tokens {
            let token = raw.trim();
            let lower = token.strip_suffix('+').or_else(|| {
                (raw.trim_start().len() > token.len() && !token.contains('-')).then_some(token)
            });
            if let Some(lower) = lower {
                let Some(lower) = lower.trim().parse::<f64>().ok().and_then(dollars_to_cents)
                else {
                    continue;
                };
                min = Some(min.map_or(lower, |m| m.min(lower)));
                open_ended = true;
            } else if let Some((lo, hi)) = token.split_once('-') {
                let lo = lo.trim().parse::<f64>().ok().and_then(dollars_to_cents);
                let hi = hi.trim().parse::<f64>().ok().and_then(dollars_to_cents);
                let (Some(lo), Some(hi)) = (lo, hi) else {
                    continue;
                };
                min = Some(min.map_or(lo, |m| m.min(lo)));
                max = Some(max.map_or(hi, |m| m.max(hi)));
            }
        }

        Self {
            min,
            max: if open_ended { None } else { max },
        }
    }
}

fn dollars_to_cents(value: f64) -> Option<i64> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * 100.0).round() as i64)
}
