//! Peg-matching between a guess and a secret.

use crate::Code;

/// Black and white peg counts for one guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Feedback {
    /// Right colour in the right position.
    pub black: u32,
    /// Right colour in the wrong position, each secret symbol used once.
    pub white: u32,
}

impl Feedback {
    pub fn is_solved(&self, code_len: usize) -> bool {
        self.black as usize == code_len
    }
}

/// Scores `guess` against `secret`.
///
/// The first pass takes exact matches out of play. The second pass walks the
/// remaining guess symbols in order and lets each consume the leftmost unused
/// equal symbol of the secret. Both codes must have the same length.
pub fn evaluate(guess: &Code, secret: &Code) -> Feedback {
    debug_assert_eq!(guess.len(), secret.len());

    let mut guess_left: Vec<Option<char>> = guess.symbols().iter().copied().map(Some).collect();
    let mut secret_left: Vec<Option<char>> = secret.symbols().iter().copied().map(Some).collect();
    let mut feedback = Feedback::default();

    for (g, s) in guess_left.iter_mut().zip(secret_left.iter_mut()) {
        if g.is_some() && *g == *s {
            feedback.black += 1;
            *g = None;
            *s = None;
        }
    }

    for g in guess_left.iter().flatten() {
        if let Some(slot) = secret_left.iter_mut().find(|s| **s == Some(*g)) {
            feedback.white += 1;
            *slot = None;
        }
    }

    feedback
}
