use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::rc::Rc;

use formats::{Feature, FeatureCollection, FeatureParseError};
use runtime::CancellationToken;
use serde_json::Value;
use streaming::{FetchError, LookupSource};
use thiserror::Error;
use tracing::{debug, info};

const LIMITS_KEY: &str = "geo_limites_getafe_emsv";
const WITH_HOUSING_KEY: &str = "geo_emsv_parcela_con_vivienda";
const WITHOUT_HOUSING_KEY: &str = "geo_emsv_parcela_sin_vivienda";
const INDEX_KEY: &str = "json_emsv_calle_num_reference";

/// Boundary layers and street index served with the viewer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseDataset {
    pub limits: Option<FeatureCollection>,
    pub parcels_with_housing: Option<FeatureCollection>,
    pub parcels_without_housing: Option<FeatureCollection>,
    pub index: AddressIndex,
}

impl BaseDataset {
    /// Missing or null members are left empty.
    pub fn from_value(value: &Value) -> Result<Self, FeatureParseError> {
        let collection = |key: &str| -> Result<Option<FeatureCollection>, FeatureParseError> {
            match value.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(v) => FeatureCollection::from_geojson_value(v).map(Some),
            }
        };
        Ok(Self {
            limits: collection(LIMITS_KEY)?,
            parcels_with_housing: collection(WITH_HOUSING_KEY)?,
            parcels_without_housing: collection(WITHOUT_HOUSING_KEY)?,
            index: value
                .get(INDEX_KEY)
                .map(AddressIndex::from_value)
                .unwrap_or_default(),
        })
    }
}

/// `street -> number -> cadastral reference`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddressIndex {
    entries: BTreeMap<String, BTreeMap<String, String>>,
    streets: Vec<String>,
}

impl AddressIndex {
    /// Reads `{street: {number: reference}}`; anything else is skipped.
    pub fn from_value(value: &Value) -> Self {
        let mut entries = BTreeMap::new();
        if let Some(obj) = value.as_object() {
            for (street, numbers) in obj {
                let Some(numbers) = numbers.as_object() else {
                    continue;
                };
                let refs: BTreeMap<String, String> = numbers
                    .iter()
                    .filter_map(|(n, r)| reference_text(r).map(|r| (n.clone(), r)))
                    .collect();
                if !refs.is_empty() {
                    entries.insert(street.clone(), refs);
                }
            }
        }
        Self::from_entries(entries)
    }

    pub fn from_entries(entries: BTreeMap<String, BTreeMap<String, String>>) -> Self {
        let mut streets: Vec<String> = entries.keys().cloned().collect();
        streets.sort_by(|a, b| compare_text(a, b));
        Self { entries, streets }
    }

    pub fn len(&self) -> usize {
        self.streets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streets.is_empty()
    }

    /// Street names ignoring case and accents when ordering.
    pub fn streets(&self) -> &[String] {
        &self.streets
    }

    /// House numbers of `street`, numeric ones in numeric order.
    pub fn numbers(&self, street: &str) -> Vec<String> {
        let Some(numbers) = self.street_entry(street) else {
            return Vec::new();
        };
        let mut out: Vec<String> = numbers.keys().cloned().collect();
        out.sort_by(|a, b| compare_numbers(a, b));
        out
    }

    pub fn reference(&self, street: &str, number: &str) -> Option<&str> {
        let numbers = self.street_entry(street)?;
        let number = number.trim();
        numbers
            .get(number)
            .or_else(|| {
                let wanted = fold(number);
                numbers
                    .iter()
                    .find(|(n, _)| fold(n) == wanted)
                    .map(|(_, r)| r)
            })
            .map(String::as_str)
    }

    fn street_entry(&self, street: &str) -> Option<&BTreeMap<String, String>> {
        self.entries.get(street).or_else(|| {
            let wanted = fold(street);
            self.entries
                .iter()
                .find(|(s, _)| fold(s) == wanted)
                .map(|(_, numbers)| numbers)
        })
    }
}

fn reference_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Upper-case, accent-free, single-spaced form used for matching.
pub fn fold(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        for c in word.chars() {
            out.push(strip_accent(c));
        }
    }
    out.to_uppercase()
}

fn strip_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' => 'a',
        'Á' | 'À' | 'Ä' | 'Â' => 'A',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'É' | 'È' | 'Ë' | 'Ê' => 'E',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
        'ó' | 'ò' | 'ö' | 'ô' => 'o',
        'Ó' | 'Ò' | 'Ö' | 'Ô' => 'O',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
        'ñ' => 'n',
        'Ñ' => 'N',
        'ç' => 'c',
        'Ç' => 'C',
        other => other,
    }
}

fn compare_text(a: &str, b: &str) -> Ordering {
    fold(a).cmp(&fold(b)).then_with(|| a.cmp(b))
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    match (leading_int(a), leading_int(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| compare_text(a, b)),
        _ => compare_text(a, b),
    }
}

/// Integer prefix of `s`, so "12B" sorts with 12.
fn leading_int(s: &str) -> Option<u64> {
    let s = s.trim();
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(s.len(), |(i, _)| i);
    s[..end].parse().ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("street and number are required")]
    EmptyInput,
    #[error("address is not in the reference index")]
    NotIndexed,
    #[error("address not found")]
    NotFound,
    #[error("lookup failed with HTTP status {0}")]
    Status(u16),
    #[error("reference has no geometry")]
    NoGeometry,
    #[error("address lookup failed: {0}")]
    Lookup(FetchError),
    #[error("base dataset unavailable: {0}")]
    DatasetUnavailable(String),
    #[error("search cancelled")]
    Cancelled,
}

impl From<FetchError> for SearchError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Cancelled => SearchError::Cancelled,
            FetchError::NotFound => SearchError::NotFound,
            FetchError::Http { status } => SearchError::Status(status),
            other => SearchError::Lookup(other),
        }
    }
}

impl SearchError {
    /// Text for the search box. Cancellation is never shown.
    pub fn user_message(&self) -> Option<String> {
        let text = match self {
            SearchError::EmptyInput => "Selecciona calle y número.".to_string(),
            SearchError::NotIndexed => {
                "No hay referencia catastral en el índice para esa dirección.".to_string()
            }
            SearchError::NotFound => "Dirección no encontrada.".to_string(),
            SearchError::Status(status) => format!("Error {status}"),
            SearchError::NoGeometry => "Referencia encontrada pero sin geometría.".to_string(),
            SearchError::Lookup(_) => "No se pudo buscar la dirección.".to_string(),
            SearchError::DatasetUnavailable(_) => {
                "No se pudo cargar el índice de direcciones.".to_string()
            }
            SearchError::Cancelled => return None,
        };
        Some(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub street: String,
    pub number: String,
    pub reference: Option<String>,
    pub feature: Feature,
}

impl SearchHit {
    pub fn popup_text(&self) -> String {
        format!(
            "{} {}\nRef. catastral: {}",
            self.street.to_uppercase(),
            self.number,
            self.reference.as_deref().unwrap_or("-")
        )
    }
}

/// Street-and-number search backed by the base dataset index.
pub struct AddressSearch<L> {
    source: Rc<L>,
    dataset: RefCell<Option<Rc<BaseDataset>>>,
}

impl<L: LookupSource> AddressSearch<L> {
    pub fn new(source: Rc<L>) -> Self {
        Self {
            source,
            dataset: RefCell::new(None),
        }
    }

    pub fn dataset(&self) -> Option<Rc<BaseDataset>> {
        self.dataset.borrow().clone()
    }

    pub async fn load_dataset(
        &self,
        token: &CancellationToken,
    ) -> Result<Rc<BaseDataset>, SearchError> {
        let value = self.source.dataset_bundle(token).await.map_err(|e| match e {
            FetchError::Cancelled => SearchError::Cancelled,
            other => SearchError::DatasetUnavailable(other.to_string()),
        })?;
        let dataset = BaseDataset::from_value(&value)
            .map_err(|e| SearchError::DatasetUnavailable(e.to_string()))?;
        info!(streets = dataset.index.len(), "base dataset loaded");
        let dataset = Rc::new(dataset);
        *self.dataset.borrow_mut() = Some(dataset.clone());
        Ok(dataset)
    }

    /// Resolves an address to its building geometry.
    ///
    /// With the index loaded the cadastral reference comes from it and the
    /// cadastre endpoint is tried first; the address lookup is the fallback
    /// and the only route while the index is missing.
    pub async fn search(
        &self,
        street: &str,
        number: &str,
        token: &CancellationToken,
    ) -> Result<SearchHit, SearchError> {
        let street = street.trim();
        let number = number.trim();
        if street.is_empty() || number.is_empty() {
            return Err(SearchError::EmptyInput);
        }

        let indexed = match self.dataset() {
            Some(dataset) => Some(
                dataset
                    .index
                    .reference(street, number)
                    .map(str::to_string)
                    .ok_or(SearchError::NotIndexed)?,
            ),
            None => None,
        };

        if let Some(refcat) = &indexed {
            match self.source.cadastre_feature(refcat, token).await {
                Ok(lookup) => {
                    if let Some(feature) = lookup.feature {
                        return Ok(SearchHit {
                            street: street.to_string(),
                            number: number.to_string(),
                            reference: Some(refcat.clone()),
                            feature,
                        });
                    }
                    debug!(refcat = %refcat, "cadastre answer without geometry");
                }
                Err(FetchError::Cancelled) => return Err(SearchError::Cancelled),
                Err(e) => debug!(refcat = %refcat, error = %e, "cadastre lookup failed; trying address lookup"),
            }
        }

        let lookup = self.source.address_lookup(street, number, token).await?;
        let feature = lookup.feature.ok_or(SearchError::NoGeometry)?;
        Ok(SearchHit {
            street: street.to_string(),
            number: number.to_string(),
            reference: indexed.or(lookup.reference),
            feature,
        })
    }

    pub async fn building_by_ref(
        &self,
        reference: &str,
        token: &CancellationToken,
    ) -> Result<Feature, SearchError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(SearchError::EmptyInput);
        }
        let feature = self.source.building_by_ref(reference, token).await?;
        if feature.usable_geometry().is_none() {
            return Err(SearchError::NoGeometry);
        }
        Ok(feature)
    }
}
