/// Dataset, service and output constants shared across the pipeline

// Default dataset locations (relative to the working directory)
pub const DEFAULT_COORDINATE_CSV: &str = "data/raw/UnApportionedIdentifiers.csv";
pub const DEFAULT_YIELD_CSV: &str = "data/raw/ICRISAT-District-Level-Data.csv";
pub const DEFAULT_OUTPUT_CSV: &str = "data/processed/integrated_data.csv";
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Environment variable that overrides the output path
pub const OUTPUT_CSV_ENV: &str = "AGRI_OUTPUT_CSV";

// Yield dataset columns
pub const YIELD_DISTRICT_COLUMN: &str = "Dist Name";
pub const YIELD_YEAR_COLUMN: &str = "Year";
pub const YIELD_STATE_COLUMNS: &[&str] = &["State Name", "State"];
/// Suffix of every per-crop yield column, e.g. "RICE YIELD (Kg per ha)"
pub const YIELD_COLUMN_SUFFIX: &str = " YIELD (Kg per ha)";

// Coordinate dataset columns
pub const COORD_DISTRICT_COLUMN: &str = "District Name";
pub const COORD_LATITUDE_COLUMN: &str = "Latitude";
pub const COORD_LONGITUDE_COLUMN: &str = "Longitude";
pub const COORD_STATE_COLUMNS: &[&str] = &["State Name", "State"];

// Soil dataset key columns
pub const SOIL_STATE_COLUMNS: &[&str] = &["State Name", "State"];

pub const DEFAULT_CROPS: &[&str] = &[
    "RICE",
    "WHEAT",
    "MAIZE",
    "PEARL MILLET",
    "BARLEY",
    "FINGER MILLET",
];

// Matching and retry policy
pub const DEFAULT_MATCH_THRESHOLD: u8 = 80;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

// Enrichment services
pub const BHUVAN_SERVICE: &str = "bhuvan";
pub const BHUVAN_BASE_URL: &str = "https://bhuvan.nrsc.gov.in/api/agri";
pub const BHUVAN_ENDPOINT: &str = "agri-params";
pub const BHUVAN_API_KEY_ENV: &str = "BHUVAN_API_KEY";

pub const VEDAS_SERVICE: &str = "vedas";
pub const VEDAS_BASE_URL: &str = "https://vedas.sac.gov.in/api/climate";
pub const VEDAS_ENDPOINT: &str = "climate-params";
pub const VEDAS_API_KEY_ENV: &str = "VEDAS_API_KEY";

/// Version tag mixed into every fallback hash. Bump it only together with
/// a deliberate change of the synthesized values.
pub const FALLBACK_HASH_VERSION: &str = "agri-fallback-v1";

// Output table columns
pub const OUTPUT_LEADING_COLUMNS: &[&str] = &[
    "district",
    "region",
    "year",
    "crop",
    "latitude",
    "longitude",
];
pub const OUTPUT_YIELD_COLUMN: &str = "yield";

// Versioning defaults
pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_AUTHOR_NAME: &str = "agri-pipeline";
pub const DEFAULT_AUTHOR_EMAIL: &str = "agri-pipeline@localhost";
