use crate::error::ContentError;

pub const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";

/// Outcome of a successful structural check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkupReport {
    /// Soft problems that do not reject the markup.
    pub warnings: Vec<String>,
}

/// Checks that `markup` is well-formed XML with an `svg` root that can draw something.
///
/// A self-closed root without attributes is rejected. A missing SVG namespace is only a warning.
pub fn validate_markup(markup: &str) -> Result<MarkupReport, ContentError> {
    let doc = roxmltree::Document::parse(markup).map_err(|err| ContentError::InvalidMarkup {
        reason: err.to_string(),
    })?;
    let root = doc.root_element();
    if root.tag_name().name() != "svg" {
        return Err(ContentError::InvalidMarkup {
            reason: format!("root element is <{}>, expected <svg>", root.tag_name().name()),
        });
    }

    let self_closed = markup[root.range()].trim_end().ends_with("/>");
    if self_closed && root.attributes().len() == 0 {
        return Err(ContentError::InvalidMarkup {
            reason: "empty self-closed <svg/> root".to_string(),
        });
    }

    let mut report = MarkupReport::default();
    if root.tag_name().namespace() != Some(SVG_NAMESPACE) {
        report
            .warnings
            .push(format!("root element does not declare xmlns=\"{SVG_NAMESPACE}\""));
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_namespaced_document() {
        let report = validate_markup(
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 1 1"><rect width="1" height="1"/></svg>"#,
        )
        .unwrap();
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn missing_namespace_is_a_warning() {
        let report = validate_markup(r#"<svg viewBox="0 0 1 1"><circle r="1"/></svg>"#).unwrap();
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn rejects_unclosed_and_foreign_roots() {
        assert!(matches!(
            validate_markup(r#"<svg xmlns="http://www.w3.org/2000/svg"><rect/>"#),
            Err(ContentError::InvalidMarkup { .. })
        ));
        assert!(matches!(
            validate_markup("<html><body/></html>"),
            Err(ContentError::InvalidMarkup { .. })
        ));
    }

    #[test]
    fn self_closed_root_needs_attributes() {
        assert!(validate_markup("<svg/>").is_err());
        assert!(validate_markup(r#"<svg xmlns="http://www.w3.org/2000/svg"/>"#).is_err());
        assert!(validate_markup(r#"<svg xmlns="http://www.w3.org/2000/svg" width="8" height="8"/>"#).is_ok());
    }
}
