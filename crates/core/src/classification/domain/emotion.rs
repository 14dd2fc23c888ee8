/// The emotion labels the annotator knows how to colour.
///
/// Classifiers may report labels outside this set; those render with the
/// neutral colour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Emotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
    Contempt,
}

pub const UNKNOWN_COLOR: [u8; 3] = [255, 255, 255];

impl Emotion {
    pub const ALL: [Emotion; 8] = [
        Emotion::Angry,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Surprise,
        Emotion::Neutral,
        Emotion::Contempt,
    ];

    /// Case-insensitive lookup of a classifier label.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|e| e.label().eq_ignore_ascii_case(label))
    }

    /// Canonical lower-case label used in score distributions.
    pub fn label(self) -> &'static str {
        match self {
            Emotion::Angry => "angry",
            Emotion::Disgust => "disgust",
            Emotion::Fear => "fear",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Surprise => "surprise",
            Emotion::Neutral => "neutral",
            Emotion::Contempt => "contempt",
        }
    }

    /// RGB colour for boxes and text.
    pub fn color(self) -> [u8; 3] {
        match self {
            Emotion::Happy => [0, 255, 0],
            Emotion::Sad => [0, 0, 255],
            Emotion::Angry => [255, 0, 0],
            Emotion::Surprise => [255, 255, 0],
            Emotion::Fear => [128, 0, 128],
            Emotion::Disgust => [128, 128, 0],
            Emotion::Neutral => UNKNOWN_COLOR,
            Emotion::Contempt => [255, 128, 0],
        }
    }
}

/// Colour for an arbitrary label, falling back to white.
pub fn color_for_label(label: &str) -> [u8; 3] {
    Emotion::from_label(label)
        .map(Emotion::color)
        .unwrap_or(UNKNOWN_COLOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("happy", Some(Emotion::Happy))]
    #[case("HAPPY", Some(Emotion::Happy))]
    #[case("Surprise", Some(Emotion::Surprise))]
    #[case("contempt", Some(Emotion::Contempt))]
    #[case("bored", None)]
    #[case("", None)]
    fn test_from_label(#[case] label: &str, #[case] expected: Option<Emotion>) {
        assert_eq!(Emotion::from_label(label), expected);
    }

    #[test]
    fn test_labels_round_trip() {
        for e in Emotion::ALL {
            assert_eq!(Emotion::from_label(e.label()), Some(e));
        }
    }

    #[rstest]
    #[case("happy", [0, 255, 0])]
    #[case("sad", [0, 0, 255])]
    #[case("angry", [255, 0, 0])]
    #[case("neutral", [255, 255, 255])]
    fn test_color_for_label(#[case] label: &str, #[case] expected: [u8; 3]) {
        assert_eq!(color_for_label(label), expected);
    }

    #[test]
    fn test_unknown_label_is_white() {
        assert_eq!(color_for_label("bored"), [255, 255, 255]);
    }

    #[test]
    fn test_colors_distinguish_non_neutral_emotions() {
        let colors: std::collections::HashSet<[u8; 3]> = Emotion::ALL
            .into_iter()
            .filter(|e| *e != Emotion::Neutral)
            .map(Emotion::color)
            .collect();
        assert_eq!(colors.len(), 7);
    }
}
