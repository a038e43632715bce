use crate::error::DecodeError;
use crate::types::PartialParse;

/// Marker used by the hosted controller page: `Orientation: [x, y, z, w]`.
pub const DEFAULT_MARKER: &str = "Orientation:";

/// Extract `[x, y, z, w]` from page text.
///
/// Looks for `marker`, then the first `[` after it and the next `]`, and
/// splits the bracketed text on `,`. Exactly four fields are required.
///
/// With [`PartialParse::Lenient`] a field that does not parse keeps the
/// matching component of `previous`; with [`PartialParse::Strict`] it rejects
/// the whole sample.
pub fn extract_components(
    text: &str,
    marker: &str,
    previous: [f32; 4],
    policy: PartialParse,
) -> Result<[f32; 4], DecodeError> {
    let marker_at = text
        .find(marker)
        .ok_or_else(|| DecodeError::MarkerNotFound(marker.to_owned()))?;
    let after_marker = &text[marker_at + marker.len()..];

    let open = after_marker.find('[').ok_or(DecodeError::MissingBrackets)?;
    let inner = &after_marker[open + 1..];
    let close = inner.find(']').ok_or(DecodeError::MissingBrackets)?;
    let inner = &inner[..close];

    let fields: Vec<&str> = inner.split(',').collect();
    if fields.len() != 4 {
        return Err(DecodeError::ComponentCount(fields.len()));
    }

    let mut q = previous;
    for (index, field) in fields.iter().enumerate() {
        let field = field.trim();
        match field.parse::<f32>() {
            Ok(value) => q[index] = value,
            Err(_) => match policy {
                PartialParse::Strict => {
                    return Err(DecodeError::InvalidComponent {
                        index,
                        text: field.to_owned(),
                    })
                }
                PartialParse::Lenient => {
                    log::trace!("Keeping previous value for component {}: {:?}", index, field);
                }
            },
        }
    }

    Ok(q)
}
