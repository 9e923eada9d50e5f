//! Localised reminder text.
//!
//! Pure functions, no clock or I/O, so they can be tested without timers.

use crate::store::model::Language;

/// Plural category of a count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PluralForm {
    One,
    Few,
    Many,
}

/// East Slavic rule shared by Russian and Ukrainian: 1, 21, 31 → one;
/// 2-4, 22-24 → few; 11-14 and everything else → many.
fn slavic_form(n: u32) -> PluralForm {
    let (tens, units) = (n % 100, n % 10);
    if units == 1 && tens != 11 {
        PluralForm::One
    } else if (2..=4).contains(&units) && !(12..=14).contains(&tens) {
        PluralForm::Few
    } else {
        PluralForm::Many
    }
}

/// The word for "day" agreeing with `n`.
pub fn day_word(language: Language, n: u32) -> &'static str {
    match language {
        Language::Ru => match slavic_form(n) {
            PluralForm::One => "день",
            PluralForm::Few => "дня",
            PluralForm::Many => "дней",
        },
        Language::Uk => match slavic_form(n) {
            PluralForm::One => "день",
            PluralForm::Few => "дні",
            PluralForm::Many => "днів",
        },
        Language::En => {
            if n == 1 {
                "day"
            } else {
                "days"
            }
        }
    }
}

pub fn reminder_title(language: Language) -> &'static str {
    match language {
        Language::Ru => "Напоминание о подписке",
        Language::Uk => "Нагадування про підписку",
        Language::En => "Subscription reminder",
    }
}

/// Body text for a payment `days` away; `0` means today.
pub fn reminder_body(language: Language, name: &str, days: u32) -> String {
    match (language, days) {
        (Language::Ru, 0) => format!("Сегодня списание по {name}"),
        (Language::Ru, n) => format!("Через {n} {} списание по {name}", day_word(language, n)),
        (Language::Uk, 0) => format!("Сьогодні списання за {name}"),
        (Language::Uk, n) => format!("Через {n} {} списання за {name}", day_word(language, n)),
        (Language::En, 0) => format!("{name} payment is due today"),
        (Language::En, n) => format!("{name} payment is due in {n} {}", day_word(language, n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn russian_day_words() {
        assert_eq!(day_word(Language::Ru, 1), "день");
        assert_eq!(day_word(Language::Ru, 2), "дня");
        assert_eq!(day_word(Language::Ru, 3), "дня");
        assert_eq!(day_word(Language::Ru, 4), "дня");
        assert_eq!(day_word(Language::Ru, 5), "дней");
        assert_eq!(day_word(Language::Ru, 11), "дней");
        assert_eq!(day_word(Language::Ru, 12), "дней");
        assert_eq!(day_word(Language::Ru, 21), "день");
        assert_eq!(day_word(Language::Ru, 22), "дня");
        assert_eq!(day_word(Language::Ru, 0), "дней");
    }

    #[test]
    fn ukrainian_and_english_day_words() {
        assert_eq!(day_word(Language::Uk, 1), "день");
        assert_eq!(day_word(Language::Uk, 3), "дні");
        assert_eq!(day_word(Language::Uk, 14), "днів");
        assert_eq!(day_word(Language::En, 1), "day");
        assert_eq!(day_word(Language::En, 2), "days");
    }

    #[test]
    fn bodies_by_day_count() {
        assert_eq!(
            reminder_body(Language::Ru, "Netflix", 0),
            "Сегодня списание по Netflix"
        );
        assert_eq!(
            reminder_body(Language::Ru, "Netflix", 1),
            "Через 1 день списание по Netflix"
        );
        assert_eq!(
            reminder_body(Language::Ru, "Netflix", 2),
            "Через 2 дня списание по Netflix"
        );
        assert_eq!(
            reminder_body(Language::En, "Spotify", 3),
            "Spotify payment is due in 3 days"
        );
        assert_eq!(reminder_title(Language::Ru), "Напоминание о подписке");
    }
}
