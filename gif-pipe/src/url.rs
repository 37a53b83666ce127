use crate::error::{PipeError, PipeResult};
use crate::viewpoint::Viewpoint;

/// Street-view still endpoint. `{size}` appears twice, the service only
/// serves square images here.
pub const DEFAULT_URL_TEMPLATE: &str = "https://maps.googleapis.com/maps/api/streetview?\
    size={size}x{size}&\
    location={lat},{lng}&\
    fov={fov}&\
    heading={heading}&\
    pitch={pitch}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Lat,
    Lng,
    Size,
    Fov,
    Heading,
    Pitch,
}

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "lat" => Some(Self::Lat),
            "lng" => Some(Self::Lng),
            "size" => Some(Self::Size),
            "fov" => Some(Self::Fov),
            "heading" => Some(Self::Heading),
            "pitch" => Some(Self::Pitch),
            _ => None,
        }
    }

    fn value<'a>(&self, viewpoint: &'a Viewpoint) -> &'a str {
        match self {
            Self::Lat => &viewpoint.lat,
            Self::Lng => &viewpoint.lng,
            Self::Size => &viewpoint.size,
            Self::Fov => &viewpoint.fov,
            Self::Heading => &viewpoint.heading,
            Self::Pitch => &viewpoint.pitch,
        }
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// Request url template with `{lat}`, `{lng}`, `{size}`, `{fov}`,
/// `{heading}` and `{pitch}` substitution points. Parsed once at startup so
/// a bad template cannot surface halfway through a run; [`render`] is pure.
///
/// [`render`]: UrlTemplate::render
#[derive(Debug, Clone)]
pub struct UrlTemplate {
    segments: Vec<Segment>,
}

impl UrlTemplate {
    pub fn new(template: &str) -> PipeResult<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(start) = rest.find('{') {
            literal.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else {
                return Err(PipeError::template(format!(
                    "unclosed placeholder in {template:?}"
                )));
            };
            let name = &after[..end];
            let field = Field::from_name(name).ok_or_else(|| {
                PipeError::template(format!("unknown placeholder {{{name}}}"))
            })?;
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Field(field));
            rest = &after[end + 1..];
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    pub fn render(&self, viewpoint: &Viewpoint) -> String {
        let mut url = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => url.push_str(text),
                Segment::Field(field) => url.push_str(field.value(viewpoint)),
            }
        }
        url
    }
}
