//! Metrics definitions for the country ingestion pipeline.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

impl MetricType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "Counter",
            MetricType::Histogram => "Histogram",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

macro_rules! counter {
    ($def:expr) => {
        ::metrics::counter!($def.name)
    };
}

macro_rules! histogram {
    ($def:expr) => {
        ::metrics::histogram!($def.name)
    };
}

pub(crate) use counter;
pub(crate) use histogram;

pub const UPSTREAM_FETCH_ATTEMPTS: MetricDef = MetricDef {
    name: "upstream.fetch.attempts",
    metric_type: MetricType::Counter,
    description: "Number of requests issued to the upstream country provider",
};

pub const UPSTREAM_FETCH_FAILURES: MetricDef = MetricDef {
    name: "upstream.fetch.failures",
    metric_type: MetricType::Counter,
    description: "Number of upstream requests that failed (transport, status or decode)",
};

pub const NORMALIZE_DEGRADED: MetricDef = MetricDef {
    name: "normalize.degraded",
    metric_type: MetricType::Counter,
    description: "Number of upstream records replaced with a degraded default record",
};

pub const STORE_UPSERT_SUCCESS: MetricDef = MetricDef {
    name: "store.upsert.success",
    metric_type: MetricType::Counter,
    description: "Number of country records written to the store",
};

pub const STORE_UPSERT_FAILURE: MetricDef = MetricDef {
    name: "store.upsert.failure",
    metric_type: MetricType::Counter,
    description: "Number of country records rolled back and skipped",
};

pub const REFRESH_DURATION: MetricDef = MetricDef {
    name: "refresh.duration",
    metric_type: MetricType::Histogram,
    description: "Time to complete a refresh in seconds",
};

pub const REFRESH_FETCHED: MetricDef = MetricDef {
    name: "refresh.fetched",
    metric_type: MetricType::Histogram,
    description: "Number of records returned by the upstream provider per refresh",
};

pub const ALL_METRICS: &[MetricDef] = &[
    UPSTREAM_FETCH_ATTEMPTS,
    UPSTREAM_FETCH_FAILURES,
    NORMALIZE_DEGRADED,
    STORE_UPSERT_SUCCESS,
    STORE_UPSERT_FAILURE,
    REFRESH_DURATION,
    REFRESH_FETCHED,
];
