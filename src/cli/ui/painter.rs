use owo_colors::{OwoColorize, Style};

/// The visual role of a piece of terminal text.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum Tone {
    Heading,
    Success,
    Warning,
    Muted,
    Value,
}

impl Tone {
    fn style(self) -> Style {
        match self {
            Self::Heading => Style::new().bold().cyan(),
            Self::Success => Style::new().bold().green(),
            Self::Warning => Style::new().bold().yellow(),
            Self::Muted => Style::new().dimmed(),
            Self::Value => Style::new().bold(),
        }
    }
}

/// Colours CLI output when stdout is a terminal.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Painter {
    use_colour: bool,
}

impl Painter {
    pub(crate) fn new(use_colour: bool) -> Self {
        Self { use_colour }
    }

    pub(crate) fn paint(&self, tone: Tone, text: impl AsRef<str>) -> String {
        let text = text.as_ref();
        if self.use_colour {
            text.style(tone.style()).to_string()
        } else {
            text.to_owned()
        }
    }

    pub(crate) fn heading(&self, text: impl AsRef<str>) -> String {
        self.paint(Tone::Heading, text)
    }

    pub(crate) fn success(&self, text: impl AsRef<str>) -> String {
        self.paint(Tone::Success, text)
    }

    pub(crate) fn warning(&self, text: impl AsRef<str>) -> String {
        self.paint(Tone::Warning, text)
    }

    pub(crate) fn muted(&self, text: impl AsRef<str>) -> String {
        self.paint(Tone::Muted, text)
    }

    pub(crate) fn value(&self, text: impl AsRef<str>) -> String {
        self.paint(Tone::Value, text)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Tone::Heading)]
    #[case(Tone::Success)]
    #[case(Tone::Warning)]
    #[case(Tone::Muted)]
    #[case(Tone::Value)]
    fn colour_is_applied_only_when_enabled(#[case] tone: Tone) {
        assert_eq!("HR_DATA", Painter::new(false).paint(tone, "HR_DATA"));

        let styled = Painter::new(true).paint(tone, "HR_DATA");
        assert_ne!("HR_DATA", styled);
        assert!(styled.contains("HR_DATA"));
    }
}
