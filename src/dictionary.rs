//! User dictionary word model
//!
//! The engine speaks snake_case JSON; the application keeps words in
//! camelCase. [`UserDictWord`] is the application form and converts to and
//! from the engine form with [`UserDictWord::from_wire`] and
//! [`UserDictWord::to_wire`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Part-of-speech category offered when registering a word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WordType {
    ProperNoun,
    CommonNoun,
    Verb,
    Adjective,
    Suffix,
}

/// Declares [`UserDictWord`], its private engine twin `WireWord` and the
/// conversion between them from one field list
macro_rules! dictionary_word {
    (
        required { $($(#[$doc:meta])* $field:ident: $ty:ty,)* }
        optional { $($opt:ident: $opt_ty:ty,)* }
    ) => {
        /// A word in the user dictionary
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct UserDictWord {
            $($(#[$doc])* pub $field: $ty,)*
            $(
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $opt: Option<$opt_ty>,
            )*
        }

        /// Engine form of [`UserDictWord`]
        #[derive(Debug, Serialize, Deserialize)]
        struct WireWord {
            $($field: $ty,)*
            $(
                #[serde(default, skip_serializing_if = "Option::is_none")]
                $opt: Option<$opt_ty>,
            )*
        }

        impl From<WireWord> for UserDictWord {
            fn from(word: WireWord) -> Self {
                Self {
                    $($field: word.$field,)*
                    $($opt: word.$opt,)*
                }
            }
        }

        impl From<UserDictWord> for WireWord {
            fn from(word: UserDictWord) -> Self {
                Self {
                    $($field: word.$field,)*
                    $($opt: word.$opt,)*
                }
            }
        }
    };
}

dictionary_word! {
    required {
        surface: String,
        priority: i64,
        part_of_speech: String,
        part_of_speech_detail_1: String,
        part_of_speech_detail_2: String,
        part_of_speech_detail_3: String,
        inflectional_type: String,
        inflectional_form: String,
        stem: String,
        /// Reading in katakana
        yomi: String,
        pronunciation: String,
        accent_type: i64,
        accent_associative_rule: String,
    }
    optional {
        context_id: i64,
        word_type: WordType,
        mora_count: i64,
    }
}

/// Dictionary listing as returned by the engine, keyed by word id
pub type UserDictWords = BTreeMap<String, UserDictWord>;

impl UserDictWord {
    /// Parse a word in engine form
    pub fn from_wire(value: &Value) -> Result<Self> {
        let wire = WireWord::deserialize(value)?;
        Ok(wire.into())
    }

    /// Render the word in engine form
    pub fn to_wire(&self) -> Value {
        // Only strings, integers and a unit enum, none of which can fail
        serde_json::to_value(WireWord::from(self.clone())).unwrap_or_default()
    }
}

/// Parse a full dictionary listing in engine form
pub fn words_from_wire(value: &Value) -> Result<UserDictWords> {
    let wire = BTreeMap::<String, WireWord>::deserialize(value)?;
    Ok(wire.into_iter().map(|(id, word)| (id, word.into())).collect())
}
