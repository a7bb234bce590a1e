//! Coordinate reference types.

use std::fmt;

/// Authority code of the fallback project CRS when a project does not
/// declare one.
pub const DEFAULT_CRS_AUTH_ID: &str = "EPSG:4326";

/// Geographic EPSG codes whose native axis order is latitude/longitude.
///
/// Axis-order metadata is consumed here, not derived: this fixed table
/// covers the geographic codes the engine publishes. Real deployments that
/// need the full authority database resolve axis order inside their
/// [`CoordTransform`] implementation.
const INVERTED_AXIS_EPSG: &[u32] = &[
    4149, 4151, 4171, 4230, 4237, 4258, 4265, 4269, 4275, 4283, 4289, 4326, 4617, 4619, 4667,
    4668,
];

/// Service protocol version, selecting the legacy compatibility rules.
///
/// The legacy version (`1.1.1`) reads the `SRS` attribute and never applies
/// axis inversion; the current version (`1.3.0`) reads `CRS` and respects
/// the CRS's native axis order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceVersion {
    /// WMS 1.1.1
    V1_1_1,
    /// WMS 1.3.0
    #[default]
    V1_3_0,
}

impl ServiceVersion {
    /// Whether this is the legacy protocol version.
    pub fn is_legacy(self) -> bool {
        self == Self::V1_1_1
    }

    /// Attribute name carrying the authority code on bounding-box nodes.
    pub fn crs_attribute(self) -> &'static str {
        if self.is_legacy() {
            "SRS"
        } else {
            "CRS"
        }
    }
}

impl fmt::Display for ServiceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1_1_1 => write!(f, "1.1.1"),
            Self::V1_3_0 => write!(f, "1.3.0"),
        }
    }
}

/// A coordinate reference system descriptor.
///
/// Carries the authority code (e.g. `EPSG:4326`), a validity flag, and the
/// axis-order metadata needed for legacy-vs-current bounding-box handling.
/// Reprojection itself is an external capability, see [`CoordTransform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrsRef {
    auth_id: String,
    valid: bool,
}

impl CrsRef {
    /// Parse an OGC-style authority code (`AUTHORITY:CODE`).
    ///
    /// Anything without both a non-empty authority and code part yields an
    /// invalid descriptor rather than an error.
    pub fn from_ogc(code: &str) -> Self {
        let trimmed = code.trim();
        let valid = matches!(
            trimmed.split_once(':'),
            Some((auth, id)) if !auth.is_empty() && !id.is_empty()
        );
        Self {
            auth_id: trimmed.to_string(),
            valid,
        }
    }

    /// Descriptor for a numeric EPSG code.
    pub fn from_epsg(code: u32) -> Self {
        Self {
            auth_id: format!("EPSG:{code}"),
            valid: true,
        }
    }

    /// The authority code as written (`EPSG:4326`).
    pub fn auth_id(&self) -> &str {
        &self.auth_id
    }

    /// Whether the descriptor parsed as a usable authority code.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Whether the CRS's native axis order is inverted (latitude first).
    pub fn axis_inverted(&self) -> bool {
        let Some((auth, id)) = self.auth_id.split_once(':') else {
            return false;
        };
        if !auth.eq_ignore_ascii_case("EPSG") {
            return false;
        }
        id.parse::<u32>()
            .map(|code| INVERTED_AXIS_EPSG.contains(&code))
            .unwrap_or(false)
    }
}

/// An axis-aligned bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl Rect {
    /// Create a rectangle from its extents.
    pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// A degenerate rectangle contributes nothing to aggregation.
    pub fn is_empty(&self) -> bool {
        self.x_max <= self.x_min || self.y_max <= self.y_min
    }

    /// Grow this rectangle to cover `other`.
    pub fn combine_extent_with(&mut self, other: &Rect) {
        self.x_min = self.x_min.min(other.x_min);
        self.y_min = self.y_min.min(other.y_min);
        self.x_max = self.x_max.max(other.x_max);
        self.y_max = self.y_max.max(other.y_max);
    }

    /// Swap the x and y axes, for CRSs with inverted native axis order.
    pub fn inverted(&self) -> Self {
        Self {
            x_min: self.y_min,
            y_min: self.x_min,
            x_max: self.y_max,
            y_max: self.x_max,
        }
    }
}

/// External coordinate-transform capability.
///
/// Reprojection math lives outside this crate. A transform that cannot
/// produce a result degrades to `None`; it never raises an error into the
/// resolution core.
pub trait CoordTransform: Send + Sync {
    /// Transform a bounding rectangle between two reference systems.
    fn transform_bbox(&self, rect: Rect, from: &CrsRef, to: &CrsRef) -> Option<Rect>;
}

/// Default transform capability: passes same-CRS rectangles through
/// unchanged and declines anything that would need actual reprojection.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTransform;

impl CoordTransform for IdentityTransform {
    fn transform_bbox(&self, rect: Rect, from: &CrsRef, to: &CrsRef) -> Option<Rect> {
        if from.auth_id().eq_ignore_ascii_case(to.auth_id()) {
            Some(rect)
        } else {
            None
        }
    }
}
