//! Process-wide language resources used by the built-in stages.
//!
//! The static tables are compiled in; `LanguageModels` merges them with an
//! optional user gazetteer once at startup and is then shared read-only by
//! every pipeline instance.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;

use thiserror::Error;

use super::ner::EntityType;

/// Errors raised while loading language resources.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read gazetteer {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("gazetteer {path} line {line}: {reason}")]
    Parse {
        path: String,
        line: usize,
        reason: String,
    },
}

// ============================================================================
// Abbreviations (lowercase, without the final period)
// ============================================================================

pub static ABBREVIATIONS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "mr", "mrs", "ms", "dr", "prof", "st", "jr", "sr", "inc", "corp", "ltd", "co", "vs",
        "etc", "e.g", "i.e", "u.s", "u.k", "u.n", "jan", "feb", "mar", "apr", "jun", "jul",
        "aug", "sep", "sept", "oct", "nov", "dec", "gen", "col", "lt", "sgt", "capt", "gov",
        "sen", "rep", "fig", "approx", "dept", "univ", "ave", "blvd", "mt", "rev", "hon",
        "a.m", "p.m", "ph.d", "cf", "al",
    ]
    .into_iter()
    .collect()
});

/// Whether `word` (as written, without its trailing period) is an abbreviation.
pub fn is_abbreviation(word: &str) -> bool {
    let trimmed = word.trim_start_matches(['"', '\'', '(', '[', '“', '‘']);
    if trimmed.is_empty() {
        return false;
    }
    let lower = trimmed.to_lowercase();
    if ABBREVIATIONS.contains(lower.as_str()) {
        return true;
    }
    let mut chars = trimmed.chars();
    // Single initials: "J."
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return c.is_alphabetic() && c.is_uppercase();
    }
    // Dotted acronyms: "U.S", "N.A.S.A"
    trimmed.contains('.')
        && trimmed
            .split('.')
            .all(|part| part.chars().count() <= 2 && part.chars().all(char::is_alphabetic))
}

// ============================================================================
// Part-of-speech lexicon
// ============================================================================

pub static CLOSED_CLASS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    let groups: &[(&str, &[&str])] = &[
        (
            "DT",
            &[
                "the", "a", "an", "this", "that", "these", "those", "every", "each", "some",
                "any", "no", "all", "both", "either", "neither", "another",
            ],
        ),
        (
            "PRP",
            &[
                "i", "you", "he", "she", "it", "we", "they", "me", "him", "us", "them",
                "myself", "yourself", "himself", "herself", "itself", "ourselves",
                "themselves",
            ],
        ),
        ("PRP$", &["my", "your", "his", "her", "its", "our", "their"]),
        ("WP", &["who", "whom", "what"]),
        ("WP$", &["whose"]),
        ("WDT", &["which"]),
        ("WRB", &["when", "where", "why", "how"]),
        (
            "IN",
            &[
                "of", "in", "on", "at", "by", "for", "with", "about", "against", "between",
                "into", "through", "during", "before", "after", "above", "below", "from",
                "over", "under", "since", "until", "while", "because", "although", "though",
                "if", "than", "as", "near", "without", "within", "among", "across", "behind",
                "beyond", "upon", "toward", "towards", "per", "via", "whether", "unless",
                "despite", "throughout", "around", "inside", "outside",
            ],
        ),
        ("TO", &["to"]),
        ("CC", &["and", "or", "but", "nor", "yet", "&"]),
        (
            "MD",
            &[
                "can", "could", "may", "might", "must", "shall", "should", "will", "would",
                "ca", "wo",
            ],
        ),
        ("EX", &["there"]),
        (
            "RB",
            &[
                "not", "n't", "never", "very", "also", "just", "only", "too", "quite",
                "rather", "already", "always", "often", "soon", "here", "now", "then",
                "again", "still", "even", "ever", "almost", "so", "later", "together",
                "away", "perhaps", "however", "yesterday", "tomorrow", "today", "once",
            ],
        ),
        ("RBR", &["more", "less"]),
        ("RBS", &["most", "least"]),
        ("JJR", &["better", "worse", "fewer", "larger", "smaller", "bigger", "older", "younger"]),
        ("JJS", &["best", "worst", "largest", "smallest", "biggest", "oldest", "youngest"]),
        (
            "CD",
            &[
                "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
                "eleven", "twelve", "twenty", "thirty", "forty", "fifty", "hundred",
                "thousand", "million", "billion",
            ],
        ),
        ("UH", &["yes", "oh", "hello", "hi", "ok", "okay", "please", "wow"]),
        ("VB", &["be"]),
        ("VBP", &["am", "are", "have", "do"]),
        ("VBZ", &["is", "has", "does"]),
        ("VBD", &["was", "were", "had", "did"]),
        ("VBN", &["been", "done"]),
        ("VBG", &["being", "having", "doing"]),
    ];
    for (tag, words) in groups {
        for word in *words {
            map.insert(*word, *tag);
        }
    }
    map
});

/// Irregular past tense forms (tagged VBD, or VBN after an auxiliary).
pub static IRREGULAR_PAST: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "met", "went", "saw", "said", "made", "took", "came", "gave", "found", "knew",
        "thought", "told", "became", "left", "felt", "brought", "began", "kept", "held",
        "wrote", "stood", "heard", "meant", "paid", "ran", "sat", "spoke", "led", "grew",
        "lost", "fell", "sent", "built", "understood", "drew", "broke", "spent", "rose",
        "drove", "bought", "wore", "chose", "won", "ate", "sold", "caught", "fought", "taught",
        "sang", "swam", "flew", "forgot", "hid", "got", "did", "won", "slept", "fed", "shot",
    ]
    .into_iter()
    .collect()
});

/// Irregular past participles.
pub static IRREGULAR_PARTICIPLES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "gone", "seen", "taken", "given", "known", "written", "spoken", "eaten", "chosen",
        "broken", "driven", "fallen", "forgotten", "hidden", "risen", "stolen", "begun",
        "drawn", "flown", "grown", "shown", "sung", "worn", "gotten", "born",
    ]
    .into_iter()
    .collect()
});

/// Base forms of common verbs.
pub static BASE_VERBS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "go", "see", "make", "take", "come", "give", "find", "know", "think", "tell",
        "become", "leave", "feel", "bring", "begin", "keep", "hold", "write", "stand", "hear",
        "meet", "run", "say", "get", "use", "work", "call", "try", "ask", "need", "want",
        "look", "help", "play", "move", "live", "believe", "happen", "include", "continue",
        "learn", "change", "lead", "understand", "watch", "follow", "stop", "create", "speak",
        "read", "allow", "add", "spend", "grow", "open", "walk", "win", "offer", "remember",
        "love", "consider", "appear", "buy", "wait", "serve", "die", "send", "expect", "build",
        "stay", "fall", "cut", "reach", "kill", "remain", "eat", "visit", "announce", "sell",
        "pay", "show", "put", "set", "sit", "like", "seem", "turn", "start", "provide",
        "report", "decide", "return", "join", "agree", "travel", "arrive", "explain",
    ]
    .into_iter()
    .collect()
});

pub static AUXILIARY_HAVE: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| ["have", "has", "had", "having", "'ve", "'d"].into_iter().collect());

pub static AUXILIARY_BE: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    ["be", "am", "is", "are", "was", "were", "been", "being", "'s", "'re", "'m"]
        .into_iter()
        .collect()
});

pub static COMMON_ADJECTIVES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "good", "new", "first", "last", "long", "great", "little", "own", "other", "old",
        "right", "big", "high", "different", "small", "large", "next", "early", "young",
        "important", "few", "public", "bad", "same", "able", "late", "hard", "major", "happy",
        "sad", "free", "full", "real", "sure", "true", "whole", "clear", "strong", "possible",
        "black", "white", "red", "blue", "green", "local", "social", "national", "political",
        "economic", "international", "many", "much", "several", "such", "recent", "final",
    ]
    .into_iter()
    .collect()
});

// ============================================================================
// Named entity resources
// ============================================================================

/// Common given names, matched case-sensitively as capitalised tokens.
pub static GIVEN_NAMES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "Alice", "Bob", "Carol", "Dave", "David", "Eve", "Frank", "Grace", "Heidi", "Ivan",
        "Judy", "Mallory", "Oscar", "Peggy", "Trent", "Victor", "Walter", "John", "Mary",
        "James", "Robert", "Michael", "William", "Richard", "Joseph", "Thomas", "Charles",
        "Christopher", "Daniel", "Matthew", "Anthony", "Mark", "Donald", "Steven", "Paul",
        "Andrew", "Joshua", "Kenneth", "Kevin", "Brian", "George", "Edward", "Ronald",
        "Timothy", "Jason", "Jeffrey", "Ryan", "Jacob", "Gary", "Nicholas", "Eric", "Jonathan",
        "Stephen", "Larry", "Justin", "Scott", "Brandon", "Benjamin", "Samuel", "Gregory",
        "Patrick", "Jack", "Dennis", "Jerry", "Tyler", "Aaron", "Henry", "Peter", "Adam",
        "Nathan", "Zachary", "Kyle", "Noah", "Ethan", "Jeremy", "Christian", "Keith", "Roger",
        "Patricia", "Jennifer", "Linda", "Elizabeth", "Barbara", "Susan", "Jessica", "Sarah",
        "Karen", "Nancy", "Lisa", "Betty", "Margaret", "Sandra", "Ashley", "Kimberly",
        "Emily", "Donna", "Michelle", "Dorothy", "Amanda", "Melissa", "Deborah", "Stephanie",
        "Rebecca", "Sharon", "Laura", "Cynthia", "Kathleen", "Amy", "Shirley", "Angela",
        "Helen", "Anna", "Brenda", "Pamela", "Nicole", "Emma", "Samantha", "Katherine",
        "Christine", "Debra", "Rachel", "Catherine", "Carolyn", "Janet", "Ruth", "Maria",
        "Heather", "Diane", "Virginia", "Julie", "Joyce", "Victoria", "Olivia", "Kelly",
        "Christina", "Lauren", "Joan", "Evelyn", "Judith", "Megan", "Cheryl", "Andrea",
        "Hannah", "Martha", "Jacqueline", "Frances", "Gloria", "Ann", "Teresa", "Kathryn",
        "Sara", "Janice", "Jean", "Alexander", "Sophia", "Isabella", "Mia", "Charlotte",
        "Amelia", "Harper", "Liam", "Lucas", "Mason", "Logan", "Oliver", "Elijah", "Leo",
        "Zoe", "Chloe", "Lily", "Ella", "Nora", "Hazel", "Ivy", "Luna", "Max", "Sam",
    ]
    .into_iter()
    .collect()
});

/// Honorifics and titles that introduce a person's name.
pub static TITLES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "mr", "mrs", "ms", "dr", "prof", "president", "director", "general", "admiral",
        "colonel", "major", "captain", "lieutenant", "sergeant", "agent", "ambassador",
        "senator", "representative", "congressman", "congresswoman", "governor", "mayor",
        "judge", "justice", "secretary", "minister", "chancellor", "king", "queen", "prince",
        "princess", "sir", "dame", "gen", "col", "lt", "sgt", "capt", "gov", "sen", "rep",
        "rev", "hon",
    ]
    .into_iter()
    .collect()
});

/// Final words that make a proper-noun run an organisation.
pub static ORG_SUFFIXES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "Inc", "Inc.", "Corp", "Corp.", "Corporation", "Ltd", "Ltd.", "LLC", "Co.", "Company",
        "University", "Institute", "Agency", "Bank", "Association", "Foundation", "Group",
        "Department", "Ministry", "Council", "Committee", "Commission", "Bureau", "Party",
        "Airlines", "Press", "Times", "Post", "Labs", "Laboratories", "Systems", "Technologies",
    ]
    .into_iter()
    .collect()
});

pub static MONTHS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "January", "February", "March", "April", "May", "June", "July", "August", "September",
        "October", "November", "December", "Jan.", "Feb.", "Mar.", "Apr.", "Jun.", "Jul.",
        "Aug.", "Sep.", "Sept.", "Oct.", "Nov.", "Dec.",
    ]
    .into_iter()
    .collect()
});

pub static WEEKDAYS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
    ]
    .into_iter()
    .collect()
});

static BUILTIN_ORGANIZATIONS: &[&str] = &[
    "CIA", "FBI", "NSA", "NSC", "DOD", "DOJ", "DOE", "DIA", "NRO", "DEA", "ATF", "FEMA", "DARPA",
    "USAID", "EPA", "IRS", "SEC", "FTC", "FCC", "FAA", "NASA", "NIST", "NIH", "CDC", "FDA",
    "USDA", "DHS", "NATO", "INTERPOL", "GAO", "OMB", "UN", "UNESCO", "WHO", "IMF", "EU",
    "Central Intelligence Agency", "Federal Bureau of Investigation", "National Security Agency",
    "Department of Defense", "Department of Justice", "Department of State",
    "Department of Homeland Security", "White House", "State Department", "Pentagon",
    "Secret Service", "U.S. Army", "U.S. Navy", "U.S. Air Force", "National Guard",
    "United Nations", "European Union", "World Bank", "Red Cross",
    "Supreme Court", "Congress", "Senate", "Google", "Microsoft", "Apple", "Amazon",
    "Stanford University", "Harvard University",
];

static BUILTIN_LOCATIONS: &[&str] = &[
    "Alabama", "Alaska", "Arizona", "Arkansas", "California", "Colorado", "Connecticut",
    "Delaware", "Florida", "Georgia", "Hawaii", "Idaho", "Illinois", "Indiana", "Iowa",
    "Kansas", "Kentucky", "Louisiana", "Maine", "Maryland", "Massachusetts", "Michigan",
    "Minnesota", "Mississippi", "Missouri", "Montana", "Nebraska", "Nevada", "New Hampshire",
    "New Jersey", "New Mexico", "New York", "North Carolina", "North Dakota", "Ohio",
    "Oklahoma", "Oregon", "Pennsylvania", "Rhode Island", "South Carolina", "South Dakota",
    "Tennessee", "Texas", "Utah", "Vermont", "Washington", "West Virginia", "Wisconsin",
    "Wyoming", "Washington D.C.", "Langley", "Quantico", "Berlin", "Moscow", "London",
    "Tokyo", "Beijing", "Paris", "Rome", "Madrid", "Havana", "Baghdad", "Kabul", "Tehran",
    "Pyongyang", "Islamabad", "Cairo", "Delhi", "Mumbai", "Sydney", "Toronto", "Chicago",
    "Boston", "Seattle", "Los Angeles", "San Francisco", "Houston", "Miami", "Atlanta",
    "America", "United States", "U.S.", "USA", "United Kingdom", "U.K.", "England",
    "Scotland", "Ireland", "France", "Germany", "Italy", "Spain", "Portugal", "Russia",
    "China", "Japan", "India", "Pakistan", "Afghanistan", "Iran", "Iraq", "Israel", "Egypt",
    "Canada", "Mexico", "Brazil", "Argentina", "Australia", "Korea", "North Korea",
    "South Korea", "Cuba", "Vietnam", "Ukraine", "Poland", "Sweden", "Norway", "Finland",
    "Europe", "Asia", "Africa", "Antarctica",
];

// ============================================================================
// Sentiment polarity (lowercase)
// ============================================================================

pub static POSITIVE_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "good", "great", "excellent", "wonderful", "amazing", "fantastic", "superb", "brilliant",
        "happy", "glad", "pleased", "delighted", "joy", "joyful", "love", "loved", "loves",
        "lovely", "like", "liked", "enjoy", "enjoyed", "beautiful", "nice", "best", "better",
        "success", "successful", "win", "won", "winning", "hope", "hopeful", "kind", "warm",
        "friendly", "helpful", "calm", "peace", "peaceful", "safe", "bright", "perfect",
        "pleasant", "proud", "thank", "thanks", "grateful", "fortunate", "lucky", "admire",
        "praise", "celebrate", "celebrated", "exciting", "excited", "fun", "charming",
        "generous", "honest", "clever", "strong", "healthy", "comfortable", "fine", "gentle",
        "recommend", "impressive", "outstanding", "positive", "benefit", "improve", "improved",
    ]
    .into_iter()
    .collect()
});

pub static NEGATIVE_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "bad", "terrible", "awful", "horrible", "poor", "worse", "worst", "sad", "unhappy",
        "angry", "upset", "hate", "hated", "hates", "dislike", "disliked", "fear", "afraid",
        "scared", "pain", "painful", "hurt", "sick", "ill", "fail", "failed", "failure", "lose",
        "lost", "losing", "loss", "war", "death", "dead", "die", "died", "kill", "killed",
        "cruel", "evil", "ugly", "boring", "broken", "wrong", "problem", "trouble", "danger",
        "dangerous", "disaster", "crisis", "grief", "miserable", "lonely", "tired", "weak",
        "dirty", "rude", "nasty", "annoying", "annoyed", "disappointed", "disappointing",
        "worried", "worry", "crime", "guilty", "regret", "sorry", "complain", "negative",
        "unfortunately", "violent", "hostile", "corrupt",
    ]
    .into_iter()
    .collect()
});

/// Words that flip the polarity of what follows them.
pub static NEGATORS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "not", "n't", "n’t", "no", "never", "nothing", "nobody", "none", "neither", "nor", "without",
        "hardly", "barely", "cannot",
    ]
    .into_iter()
    .collect()
});

/// Conjunctions after which the rest of the sentence outweighs what came
/// before.
pub static CONTRASTIVE: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| ["but", "however", "yet", "although", "though"].into_iter().collect());

/// Language resources shared read-only by all pipeline instances.
#[derive(Debug, Clone)]
pub struct LanguageModels {
    /// Lowercased, space-joined phrase -> entity type.
    gazetteer: HashMap<String, EntityType>,
    max_phrase_tokens: usize,
    user_entries: usize,
}

impl LanguageModels {
    /// Built-in resources only.
    pub fn builtin() -> Self {
        let mut models = Self {
            gazetteer: HashMap::new(),
            max_phrase_tokens: 1,
            user_entries: 0,
        };
        for name in BUILTIN_ORGANIZATIONS {
            models.insert(name, EntityType::Organization);
        }
        for name in BUILTIN_LOCATIONS {
            models.insert(name, EntityType::Location);
        }
        models
    }

    /// Built-in resources extended with a user gazetteer file, if given.
    ///
    /// The file holds one `phrase<TAB>LABEL` entry per line; blank lines and
    /// lines starting with `#` are ignored.
    pub fn load(gazetteer: Option<&Path>) -> Result<Self, ModelError> {
        let mut models = Self::builtin();
        if let Some(path) = gazetteer {
            let origin = path.display().to_string();
            let contents = std::fs::read_to_string(path).map_err(|source| ModelError::Read {
                path: origin.clone(),
                source,
            })?;
            models.extend_from_str(&contents, &origin)?;
            tracing::info!(
                path = %origin,
                entries = models.user_entries,
                "Loaded user gazetteer"
            );
        }
        Ok(models)
    }

    fn extend_from_str(&mut self, contents: &str, origin: &str) -> Result<(), ModelError> {
        for (index, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (phrase, label) = line.split_once('\t').ok_or_else(|| ModelError::Parse {
                path: origin.to_string(),
                line: index + 1,
                reason: "expected `phrase<TAB>LABEL`".to_string(),
            })?;
            let entity = EntityType::from_label(label.trim()).ok_or_else(|| ModelError::Parse {
                path: origin.to_string(),
                line: index + 1,
                reason: format!("unknown entity label `{}`", label.trim()),
            })?;
            self.insert(phrase.trim(), entity);
            self.user_entries += 1;
        }
        Ok(())
    }

    fn insert(&mut self, phrase: &str, entity: EntityType) {
        let key = normalize_phrase(phrase.split_whitespace());
        let tokens = key.split(' ').count();
        self.max_phrase_tokens = self.max_phrase_tokens.max(tokens);
        self.gazetteer.insert(key, entity);
    }

    /// Look up a token sequence in the gazetteer.
    pub fn lookup<'a>(&self, tokens: impl IntoIterator<Item = &'a str>) -> Option<EntityType> {
        self.gazetteer.get(&normalize_phrase(tokens)).copied()
    }

    pub fn max_phrase_tokens(&self) -> usize {
        self.max_phrase_tokens
    }

    pub fn user_entries(&self) -> usize {
        self.user_entries
    }

    pub fn is_given_name(&self, word: &str) -> bool {
        GIVEN_NAMES.contains(word)
    }

    /// +1 for a positive word, -1 for a negative one, 0 otherwise.
    pub fn polarity(&self, word: &str) -> i32 {
        let lower = word.to_lowercase();
        if POSITIVE_WORDS.contains(lower.as_str()) {
            1
        } else if NEGATIVE_WORDS.contains(lower.as_str()) {
            -1
        } else {
            0
        }
    }

    pub fn is_negator(&self, word: &str) -> bool {
        NEGATORS.contains(word.to_lowercase().as_str())
    }

    pub fn is_contrastive(&self, word: &str) -> bool {
        CONTRASTIVE.contains(word.to_lowercase().as_str())
    }
}

impl Default for LanguageModels {
    fn default() -> Self {
        Self::builtin()
    }
}

fn normalize_phrase<'a>(tokens: impl IntoIterator<Item = &'a str>) -> String {
    tokens
        .into_iter()
        .map(|t| t.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbreviations() {
        assert!(is_abbreviation("Mr"));
        assert!(is_abbreviation("e.g"));
        assert!(is_abbreviation("U.S"));
        assert!(is_abbreviation("J"));
        assert!(!is_abbreviation("Bob"));
        assert!(!is_abbreviation("end"));
    }

    #[test]
    fn test_builtin_lookup_is_case_insensitive() {
        let models = LanguageModels::builtin();
        assert_eq!(models.lookup(["New", "York"]), Some(EntityType::Location));
        assert_eq!(models.lookup(["fbi"]), Some(EntityType::Organization));
        assert_eq!(models.lookup(["Nowhere"]), None);
        assert!(models.max_phrase_tokens() >= 4);
    }

    #[test]
    fn test_polarity_lookup() {
        let models = LanguageModels::builtin();
        assert_eq!(models.polarity("Wonderful"), 1);
        assert_eq!(models.polarity("awful"), -1);
        assert_eq!(models.polarity("table"), 0);
        assert!(models.is_negator("n't"));
        assert!(models.is_contrastive("But"));
        assert!(POSITIVE_WORDS.is_disjoint(&NEGATIVE_WORDS));
    }

    #[test]
    fn test_load_user_gazetteer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gazetteer.tsv");
        std::fs::write(&path, "# custom\nAcme Widgets\tORGANIZATION\n\nGotham\tLOCATION\n").unwrap();

        let models = LanguageModels::load(Some(&path)).unwrap();
        assert_eq!(models.user_entries(), 2);
        assert_eq!(models.lookup(["Acme", "Widgets"]), Some(EntityType::Organization));
        assert_eq!(models.lookup(["Gotham"]), Some(EntityType::Location));
    }

    #[test]
    fn test_load_rejects_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gazetteer.tsv");
        std::fs::write(&path, "Gotham\tPLANET\n").unwrap();
        assert!(matches!(
            LanguageModels::load(Some(&path)),
            Err(ModelError::Parse { line: 1, .. })
        ));

        let missing = dir.path().join("missing.tsv");
        assert!(matches!(
            LanguageModels::load(Some(&missing)),
            Err(ModelError::Read { .. })
        ));
    }
}
