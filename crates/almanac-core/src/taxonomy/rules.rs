//! Ordered Wikidata class rules mapping entities to arts categories.
//!
//! Two rule families exist. Work rules match an entity that is (or is a
//! transitive instance/subclass of) one of a row's classes. Occupation rules
//! apply only to humans (`Q5`) and match on the transitive closure of the
//! entity's occupations (`P106`). Every work row outranks every occupation
//! row; within a family, table order is priority order. The first matching
//! row decides the category, so an entity never gets more than one.
//!
//! # Example
//!
//! ```
//! use almanac_core::taxonomy::{ArtsRules, EntityFacts};
//! use almanac_core::{Category, Qid};
//!
//! let rules = ArtsRules::standard();
//! let film = Qid::from_number(11424);
//! let facts = EntityFacts::new(Qid::from_number(1)).with_classes([film]);
//! let (_, category) = rules.classify_facts(&facts).unwrap();
//! assert_eq!(category, Category::FilmTv);
//! ```

use std::collections::{BTreeMap, HashSet};

use crate::model::{Category, Qid};

/// `Q5`, the Wikidata class of human beings.
pub const HUMAN: Qid = Qid::from_number(5);

// ---------------------------------------------------------------------------
// Rule tables
// ---------------------------------------------------------------------------

type TableRow = (&'static str, RuleLabel, &'static [u64]);

/// Work and organization rows, highest priority first.
const WORK_TABLE: &[TableRow] = &[
    (
        "musical work",
        RuleLabel::Music,
        &[
            105_543_609, // musical work/composition
            207_628,     // musical composition
            7366,        // song
            482_994,     // album
            134_556,     // single
            1344,        // opera
        ],
    ),
    (
        "music organization or event",
        RuleLabel::Music,
        &[
            215_380,   // musical group
            2_088_357, // musical ensemble
            18127,     // record label
            1_573_906, // concert tour
            868_557,   // music festival
        ],
    ),
    (
        "film or television work",
        RuleLabel::FilmTv,
        &[
            11424,      // film
            202_866,    // animated film
            506_240,    // television film
            24856,      // film series
            5_398_426,  // television series
            15416,      // television program
            21_191_270, // television series episode
        ],
    ),
    (
        "film or television organization",
        RuleLabel::FilmTv,
        &[
            1_762_059, // film production company
            2_001_305, // television channel
            220_505,   // film festival
        ],
    ),
    (
        "written work",
        RuleLabel::Books,
        &[
            7_725_634,  // literary work
            47_461_344, // written work
            571,        // book
            8261,       // novel
            5_185_279,  // poem
            1004,       // comics
            41298,      // magazine
        ],
    ),
    (
        "publisher",
        RuleLabel::Books,
        &[
            2_085_381, // publisher
        ],
    ),
    (
        "visual or stage work",
        RuleLabel::VisualOrPerformance,
        &[
            838_948,   // work of art
            3_305_213, // painting
            860_861,   // sculpture
            125_191,   // photograph
            25379,     // play
            2743,      // musical theatre
            667_276,   // art exhibition
        ],
    ),
    (
        "visual or stage venue",
        RuleLabel::VisualOrPerformance,
        &[
            742_421, // theatre company
            207_694, // art museum
            24354,   // theatre building
        ],
    ),
    (
        "award",
        RuleLabel::AwardsOrgs,
        &[
            618_779,   // award
            4_504_495, // award ceremony
        ],
    ),
];

/// Occupation rows for humans, highest priority first.
const OCCUPATION_TABLE: &[TableRow] = &[
    (
        "music occupation",
        RuleLabel::Music,
        &[
            639_669,   // musician
            177_220,   // singer
            36834,     // composer
            753_110,   // songwriter
            158_852,   // conductor
            183_945,   // record producer
            2_252_262, // rapper
            130_857,   // disc jockey
        ],
    ),
    (
        "screen occupation",
        RuleLabel::FilmTv,
        &[
            33999,     // actor
            2_405_480, // voice actor
            2_526_255, // film director
            28389,     // screenwriter
            3_282_637, // film producer
            947_873,   // television presenter
            222_344,   // cinematographer
        ],
    ),
    (
        "literary occupation",
        RuleLabel::Books,
        &[
            36180,     // writer
            482_980,   // author
            6_625_963, // novelist
            49757,     // poet
            214_917,   // playwright
            715_301,   // comics artist
        ],
    ),
    (
        "visual or stage occupation",
        RuleLabel::VisualOrPerformance,
        &[
            1_028_181, // painter
            1_281_618, // sculptor
            33231,     // photographer
            3_391_743, // visual artist
            5_716_684, // dancer
            2_490_358, // choreographer
            245_068,   // comedian
            483_501,   // artist
        ],
    ),
];

// ---------------------------------------------------------------------------
// Rule types
// ---------------------------------------------------------------------------

/// Category label as written in the rule tables.
///
/// [`RuleLabel::VisualOrPerformance`] is the internal name for the
/// performance category; it never reaches output because records carry a
/// [`Category`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleLabel {
    Music,
    FilmTv,
    Books,
    VisualOrPerformance,
    AwardsOrgs,
}

impl RuleLabel {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Music => "music",
            Self::FilmTv => "film_tv",
            Self::Books => "books",
            Self::VisualOrPerformance => "visual_or_performance",
            Self::AwardsOrgs => "awards",
        }
    }

    #[must_use]
    pub const fn category(&self) -> Category {
        match self {
            Self::Music => Category::Music,
            Self::FilmTv => Category::FilmTv,
            Self::Books => Category::Books,
            Self::VisualOrPerformance => Category::Performance,
            Self::AwardsOrgs => Category::Awards,
        }
    }
}

/// Which table a rule belongs to. Work rows always outrank occupation rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuleFamily {
    Work,
    Occupation,
}

/// Position of a row within the rule tables.
///
/// The derived ordering is the priority ordering: lower wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleRef {
    pub family: RuleFamily,
    pub index: usize,
}

impl RuleRef {
    #[must_use]
    pub const fn work(index: usize) -> Self {
        Self {
            family: RuleFamily::Work,
            index,
        }
    }

    #[must_use]
    pub const fn occupation(index: usize) -> Self {
        Self {
            family: RuleFamily::Occupation,
            index,
        }
    }
}

/// One row: any of `classes` (transitively) implies `label`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRule {
    pub name: String,
    pub label: RuleLabel,
    pub classes: Vec<Qid>,
}

impl ClassRule {
    pub fn new(name: impl Into<String>, label: RuleLabel, classes: &[u64]) -> Self {
        Self {
            name: name.into(),
            label,
            classes: classes.iter().copied().map(Qid::from_number).collect(),
        }
    }

    /// Whether any of this row's classes is in `closure`.
    pub fn matches(&self, closure: &HashSet<Qid>) -> bool {
        self.classes.iter().any(|c| closure.contains(c))
    }
}

/// Type facts about one entity, already closed under `subclass of`.
///
/// `classes` holds the entity itself, every class it is an instance of, and
/// every ancestor of those classes. `occupations` holds the entity's
/// occupations and their ancestors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityFacts {
    pub qid: Qid,
    pub classes: HashSet<Qid>,
    pub occupations: HashSet<Qid>,
}

impl EntityFacts {
    pub fn new(qid: Qid) -> Self {
        Self {
            qid,
            classes: HashSet::from([qid]),
            occupations: HashSet::new(),
        }
    }

    #[must_use]
    pub fn with_classes(mut self, classes: impl IntoIterator<Item = Qid>) -> Self {
        self.classes.extend(classes);
        self
    }

    #[must_use]
    pub fn with_occupations(mut self, occupations: impl IntoIterator<Item = Qid>) -> Self {
        self.occupations.extend(occupations);
        self
    }

    pub fn is_human(&self) -> bool {
        self.classes.contains(&HUMAN)
    }
}

// ---------------------------------------------------------------------------
// Rule set
// ---------------------------------------------------------------------------

/// The complete, ordered rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtsRules {
    work: Vec<ClassRule>,
    occupation: Vec<ClassRule>,
}

impl Default for ArtsRules {
    fn default() -> Self {
        Self::standard()
    }
}

impl ArtsRules {
    /// Build a rule set from explicit tables (used by tests and callers that
    /// need a narrower taxonomy).
    pub fn new(work: Vec<ClassRule>, occupation: Vec<ClassRule>) -> Self {
        Self { work, occupation }
    }

    /// The built-in arts taxonomy.
    pub fn standard() -> Self {
        let build = |table: &[TableRow]| {
            table
                .iter()
                .map(|(name, label, classes)| ClassRule::new(*name, *label, classes))
                .collect::<Vec<_>>()
        };
        Self {
            work: build(WORK_TABLE),
            occupation: build(OCCUPATION_TABLE),
        }
    }

    pub fn work_rules(&self) -> &[ClassRule] {
        &self.work
    }

    pub fn occupation_rules(&self) -> &[ClassRule] {
        &self.occupation
    }

    /// Every row in priority order.
    pub fn iter(&self) -> impl Iterator<Item = (RuleRef, &ClassRule)> {
        let work = self
            .work
            .iter()
            .enumerate()
            .map(|(i, r)| (RuleRef::work(i), r));
        let occupation = self
            .occupation
            .iter()
            .enumerate()
            .map(|(i, r)| (RuleRef::occupation(i), r));
        work.chain(occupation)
    }

    pub fn rule(&self, rule: RuleRef) -> Option<&ClassRule> {
        match rule.family {
            RuleFamily::Work => self.work.get(rule.index),
            RuleFamily::Occupation => self.occupation.get(rule.index),
        }
    }

    /// Flat priority number of a row (`0` is the strongest). Used as the
    /// `?rule` binding in SPARQL queries.
    pub fn priority(&self, rule: RuleRef) -> usize {
        match rule.family {
            RuleFamily::Work => rule.index,
            RuleFamily::Occupation => self.work.len() + rule.index,
        }
    }

    /// Inverse of [`ArtsRules::priority`].
    pub fn rule_at_priority(&self, priority: usize) -> Option<RuleRef> {
        if priority < self.work.len() {
            Some(RuleRef::work(priority))
        } else if priority < self.work.len() + self.occupation.len() {
            Some(RuleRef::occupation(priority - self.work.len()))
        } else {
            None
        }
    }

    /// Every row matched by `facts`, in priority order.
    pub fn hits(&self, facts: &EntityFacts) -> Vec<RuleRef> {
        let human = facts.is_human();
        self.iter()
            .filter(|(rule, row)| match rule.family {
                RuleFamily::Work => row.matches(&facts.classes),
                RuleFamily::Occupation => human && row.matches(&facts.occupations),
            })
            .map(|(rule, _)| rule)
            .collect()
    }

    /// First matching row and its category.
    pub fn classify_facts(&self, facts: &EntityFacts) -> Option<(RuleRef, Category)> {
        let rule = self.hits(facts).into_iter().next()?;
        self.rule(rule).map(|row| (rule, row.label.category()))
    }

    /// Collapse backend hits to one category per entity, keeping the
    /// strongest row for each. Hits naming unknown rows are ignored.
    pub fn resolve(&self, hits: impl IntoIterator<Item = (Qid, RuleRef)>) -> BTreeMap<Qid, Category> {
        let mut best: BTreeMap<Qid, RuleRef> = BTreeMap::new();
        for (qid, rule) in hits {
            if self.rule(rule).is_none() {
                log::warn!("Ignoring hit for {} on unknown rule {:?}", qid, rule);
                continue;
            }
            best.entry(qid)
                .and_modify(|current| {
                    if rule < *current {
                        *current = rule;
                    }
                })
                .or_insert(rule);
        }

        best.into_iter()
            .filter_map(|(qid, rule)| self.rule(rule).map(|row| (qid, row.label.category())))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
