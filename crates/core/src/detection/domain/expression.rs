/// The fixed emotion label set.
///
/// Declaration order is the canonical enumeration order and doubles as the
/// tie-break order for `ExpressionScores::dominant`: on equal scores the
/// earlier label wins. Backends that emit scores in a different wire order
/// must map indices explicitly; they must not rely on this ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Expression {
    Neutral,
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgusted,
    Surprised,
}

impl Expression {
    pub const COUNT: usize = 7;

    /// All labels in enumeration order.
    pub const ALL: [Expression; Expression::COUNT] = [
        Expression::Neutral,
        Expression::Happy,
        Expression::Sad,
        Expression::Angry,
        Expression::Fearful,
        Expression::Disgusted,
        Expression::Surprised,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Expression::Neutral => "neutral",
            Expression::Happy => "happy",
            Expression::Sad => "sad",
            Expression::Angry => "angry",
            Expression::Fearful => "fearful",
            Expression::Disgusted => "disgusted",
            Expression::Surprised => "surprised",
        }
    }
}

/// Per-face probability scores over the fixed label set.
///
/// Values come straight from the model and need not sum to 1.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExpressionScores([f32; Expression::COUNT]);

impl ExpressionScores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, label: Expression) -> f32 {
        self.0[label as usize]
    }

    pub fn set(&mut self, label: Expression, score: f32) {
        self.0[label as usize] = score;
    }

    /// Builder-style `set`, convenient for literals in tests and stubs.
    pub fn with(mut self, label: Expression, score: f32) -> Self {
        self.set(label, score);
        self
    }

    /// `(label, score)` pairs in enumeration order.
    pub fn iter(&self) -> impl Iterator<Item = (Expression, f32)> + '_ {
        Expression::ALL.iter().map(move |&label| (label, self.get(label)))
    }

    /// Reduce the distribution to its dominant label and that label's score.
    ///
    /// Scans the fixed enumeration order and replaces the running maximum
    /// only on a strictly greater score, so the earlier label wins ties.
    /// Identical input always yields an identical result.
    pub fn dominant(&self) -> (Expression, f32) {
        let mut best = Expression::ALL[0];
        let mut best_score = self.get(best);
        for &label in &Expression::ALL[1..] {
            let score = self.get(label);
            if score > best_score {
                best = label;
                best_score = score;
            }
        }
        (best, best_score)
    }
}
