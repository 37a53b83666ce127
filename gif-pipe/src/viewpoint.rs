use regex::Regex;

/// One street-level camera position, captured as text straight from the
/// input line. Fields are substituted into the request url as-is, the remote
/// service is the one that judges their values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewpoint {
    pub lat: String,
    pub lng: String,
    pub size: String,
    pub fov: String,
    pub heading: String,
    pub pitch: String,
}

/// A viewpoint tagged with its input position. `seq` starts at 0 and is the
/// only thing that survives out-of-order downloads.
#[derive(Debug, Clone)]
pub struct Request {
    pub seq: usize,
    pub viewpoint: Viewpoint,
}

/// One numeric-ish field: optional minus, digits, optional decimal part and
/// an exponent tail like `e-5`.
const FIELD: &str = r"-*\d+\.*\d*\w*[-+]?\d*";

/// Parses `lat, lng, size, fov, heading, pitch` lines, e.g.
/// `40.721184,-69.988354, 400, 90, 90, 0`. Anchored at the line start,
/// anything after the sixth field is ignored.
pub struct ViewpointParser {
    pattern: Regex,
}

impl ViewpointParser {
    pub fn new() -> Self {
        let pattern = format!(
            r"^({f}),\s*({f}),\s*({f}),\s*({f}),\s*({f}),\s*({f})\s*",
            f = FIELD
        );
        Self {
            // The pattern is assembled from constants above
            pattern: Regex::new(&pattern).expect("viewpoint pattern compiles"),
        }
    }

    /// `None` means the line is not a viewpoint record; the caller decides
    /// whether that is fatal.
    pub fn parse(&self, line: &str) -> Option<Viewpoint> {
        let caps = self.pattern.captures(line)?;
        Some(Viewpoint {
            lat: caps[1].to_string(),
            lng: caps[2].to_string(),
            size: caps[3].to_string(),
            fov: caps[4].to_string(),
            heading: caps[5].to_string(),
            pitch: caps[6].to_string(),
        })
    }
}

impl Default for ViewpointParser {
    fn default() -> Self {
        Self::new()
    }
}
