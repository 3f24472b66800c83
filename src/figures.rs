//! Figures
//!
//! Small composable layouts of values and text. A [`Figure`] declares a custom root
//! representation, so displaying one shows exactly its part.

use crate::capability::{has_own_capability, Capabilities, Capability};
use crate::engine::active_renderer;
use crate::error::RenderError;
use crate::repr::text::to_text;
use crate::repr::Part;
use crate::value::Displayable;
use std::borrow::Cow;

#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    part: Part,
}

impl Figure {
    pub fn part(&self) -> &Part {
        &self.part
    }

    pub fn into_part(self) -> Part {
        self.part
    }
}

impl Displayable for Figure {
    fn type_name(&self) -> Cow<'_, str> {
        Cow::Borrowed("Figure")
    }

    fn own_capabilities(&self) -> Capabilities {
        Capabilities::of(&[Capability::CustomRootRepr])
    }

    fn summary(&self) -> String {
        to_text(&self.part)
    }

    fn root_repr(&self) -> Option<Result<Part, RenderError>> {
        Some(Ok(self.part.clone()))
    }
}

/// Anything that can be placed in a figure.
pub enum Subfigure<'a> {
    /// Shown as itself.
    Text(Cow<'a, str>),
    Figure(Figure),
    Value(&'a dyn Displayable),
}

impl<'a> From<&'a str> for Subfigure<'a> {
    fn from(text: &'a str) -> Self {
        Subfigure::Text(Cow::Borrowed(text))
    }
}

impl From<String> for Subfigure<'_> {
    fn from(text: String) -> Self {
        Subfigure::Text(Cow::Owned(text))
    }
}

impl From<Figure> for Subfigure<'_> {
    fn from(figure: Figure) -> Self {
        Subfigure::Figure(figure)
    }
}

impl<'a> From<&'a dyn Displayable> for Subfigure<'a> {
    fn from(value: &'a dyn Displayable) -> Self {
        Subfigure::Value(value)
    }
}

/// Font size for [`with_font_size`].
#[derive(Debug, Clone, PartialEq)]
pub enum FontSize {
    /// Multiplier of the current size.
    Scale(f64),
    /// Any CSS font size, such as `14pt`.
    Css(String),
}

/// Convert a subfigure to a part.
///
/// Values with their own HTML are embedded; other values are rendered with the
/// active renderer.
pub fn part_from_subfigure(subfigure: Subfigure<'_>) -> Result<Part, RenderError> {
    match subfigure {
        Subfigure::Text(text) => Ok(Part::Text(text.into_owned())),
        Subfigure::Figure(figure) => Ok(figure.into_part()),
        Subfigure::Value(value) => {
            if has_own_capability(value, Capability::NativeHtml) {
                if let Some(html) = value.repr_html() {
                    return Ok(Part::EmbeddedHtml {
                        html,
                        fallback: value.summary(),
                    });
                }
            }
            Ok(active_renderer()
                .get()
                .build_representation(value, false)?
                .into_root())
        }
    }
}

pub fn figure_from_part(part: Part) -> Figure {
    Figure { part }
}

/// Arrange subfigures along a line.
pub fn inline<'a>(
    subfigures: impl IntoIterator<Item = Subfigure<'a>>,
    wrap: bool,
) -> Result<Figure, RenderError> {
    let parts = subfigures
        .into_iter()
        .map(part_from_subfigure)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(figure_from_part(Part::WordWrap {
        allow: wrap,
        child: Box::new(Part::Siblings(parts)),
    }))
}

pub fn indented(subfigure: Subfigure<'_>) -> Result<Figure, RenderError> {
    Ok(figure_from_part(Part::Indented(vec![
        Part::VerticalSpace("0.25em".to_string()),
        part_from_subfigure(subfigure)?,
        Part::VerticalSpace("0.25em".to_string()),
    ])))
}

/// Apply a CSS style string.
pub fn styled(subfigure: Subfigure<'_>, style: &str) -> Result<Figure, RenderError> {
    Ok(figure_from_part(Part::styled(
        part_from_subfigure(subfigure)?,
        style,
    )))
}

pub fn with_font_size(subfigure: Subfigure<'_>, size: FontSize) -> Result<Figure, RenderError> {
    let style = match size {
        FontSize::Scale(scale) => format!("font-size: {}em", scale),
        FontSize::Css(css) => format!("font-size: {}", css),
    };
    styled(subfigure, &style)
}

pub fn with_color(subfigure: Subfigure<'_>, color: &str) -> Result<Figure, RenderError> {
    styled(subfigure, &format!("color: {}", color))
}

pub fn bolded(subfigure: Subfigure<'_>) -> Result<Figure, RenderError> {
    styled(subfigure, "font-weight: bold")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repr::html::to_html;
    use serde_json::json;

    #[test]
    fn test_inline_mixes_text_and_values() {
        let value = json!([1]);
        let figure = inline(
            vec![
                Subfigure::from("x ="),
                Subfigure::from(" "),
                Subfigure::from(&value as &dyn Displayable),
            ],
            false,
        )
        .unwrap();
        assert_eq!(to_text(figure.part()), "x = array(\n  [0]: 1,\n)");
        assert!(to_html(figure.part()).starts_with(r#"<span class="fs-nowrap">"#));
    }

    #[test]
    fn test_styles_compose() {
        let figure = with_color(bolded("hi".into()).unwrap().into(), "red").unwrap();
        assert_eq!(
            figure.part(),
            &Part::styled(Part::styled(Part::text("hi"), "font-weight: bold"), "color: red")
        );
        let scaled = with_font_size("a".into(), FontSize::Scale(1.5)).unwrap();
        assert!(to_html(scaled.part()).contains("font-size: 1.5em"));
    }

    #[test]
    fn test_figure_declares_root_repr() {
        let figure = figure_from_part(Part::text("f"));
        assert!(has_own_capability(&figure, Capability::CustomRootRepr));
        assert_eq!(figure.summary(), "f");
    }
}
