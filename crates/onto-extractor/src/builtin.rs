//! Built-in pattern sets
//!
//! A generic set usable for any text, plus legal, medical and business
//! sets that layer their own classes on top of it. Within a class, earlier
//! alternatives win when two match at the same offset.

use onto_core::{EntityType as T, GENERIC_DOMAIN};

use crate::patterns::{DomainSpec, RelationPatternSpec as Rel};

const MONTHS: &str =
    "January|February|March|April|May|June|July|August|September|October|November|December";

// ============================================================================
// Generic
// ============================================================================

pub fn generic_domain() -> DomainSpec {
    DomainSpec::new(GENERIC_DOMAIN)
        .expects(&[T::Person, T::Organization, T::Date, T::Location, T::Money])
        // Person
        .entity(
            T::Person,
            r"\b(?:Mr|Mrs|Ms|Mx|Dr|Prof|Judge|Justice|Sen|Rep)\.?\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?",
            0.85,
        )
        .entity(
            T::Person,
            r"\b(?:Alice|Bob|Carol|Charlie|David|Emma|Eve|Frank|Grace|Henry|Isabel|Jack|James|John|Julia|Laura|Linda|Maria|Mary|Michael|Olivia|Paul|Peter|Robert|Sarah|Sophia|Thomas|William)(?:\s+[A-Z][a-z]+)?\b",
            0.75,
        )
        .entity(T::Person, r"\b[A-Z][a-z]+\s+[A-Z]\.\s+[A-Z][a-z]+\b", 0.65)
        // Weak candidates stay below the default confidence floor.
        .entity(T::Person, r"\b[A-Z][a-z]+\s+[A-Z][a-z]{2,}\b", 0.28)
        // Organization
        .entity(
            T::Organization,
            r"\b[A-Z][\w&'-]*(?:\s+(?:[A-Z][\w&'-]*|of|and|&))*\s+(?:(?:Corp|Inc|Ltd|Co)\b\.?|(?:Corporation|Incorporated|Limited|LLC|LLP|PLC|GmbH|Company|Group|Holdings|Partners|Bank|University|Hospital|Clinic|Foundation|Institute|Agency)\b)",
            0.85,
        )
        .entity(
            T::Organization,
            r"\b(?:Microsoft|Google|Apple|Amazon|IBM|Oracle|Intel|Netflix|Tesla|OpenAI|Pfizer|Moderna|NASA|FDA|WHO|SEC|FBI|United Nations)\b",
            0.8,
        )
        .entity(T::Organization, r"\b[A-Z]{2,5}\b", 0.25)
        // Date
        .entity(
            T::Date,
            &format!(
                r"\b(?:\d{{4}}-\d{{2}}-\d{{2}}|\d{{1,2}}/\d{{1,2}}/\d{{2,4}}|(?:{MONTHS})\s+\d{{1,2}}(?:st|nd|rd|th)?,?\s+\d{{4}}|\d{{1,2}}\s+(?:{MONTHS})\s+\d{{4}}|(?:{MONTHS})\s+\d{{4}})\b"
            ),
            0.9,
        )
        // Location
        .entity(
            T::Location,
            r"\b(?:New York|Los Angeles|San Francisco|Chicago|Boston|Seattle|London|Paris|Berlin|Tokyo|Seoul|Beijing|Toronto|Sydney|California|Texas|Delaware|England|France|Germany|Japan|Korea|China|Canada|United States)\b",
            0.8,
        )
        .entity(
            T::Location,
            r"\b(?:in|near|from)\s+(?P<span>[A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)",
            0.5,
        )
        // Amounts
        .entity(
            T::Money,
            r"(?:[$€£¥]\s?\d{1,3}(?:,\d{3})*(?:\.\d+)?|\b\d+(?:\.\d+)?\s?(?:USD|EUR|GBP|dollars|euros)\b)(?:\s(?:million|billion|thousand)\b)?",
            0.9,
        )
        .entity(T::Percentage, r"\b\d+(?:\.\d+)?(?:\s?%|\s?percent\b)", 0.9)
        .entity(
            T::Duration,
            r"\b\d+\s+(?:days?|weeks?|months?|years?|hours?)\b",
            0.85,
        )
        .entity(
            T::Role,
            r"\b(?:CEO|CFO|CTO|COO|President|Director|Manager|Chairman|Chairwoman|Founder|Engineer|Attorney|Lawyer|Nurse|Physician|Surgeon)\b",
            0.65,
        )
        // Relationships
        .relation(
            Rel::new(
                "EMPLOYED_BY",
                r"\b(?:works?\s+(?:for|at|with)|worked\s+(?:for|at)|is\s+employed\s+(?:by|at)|employed\s+(?:by|at)|joined|hired\s+by|is\s+(?:an?\s+)?(?:\w+\s+)?(?:at|of))\b",
                0.85,
            )
            .between(&[T::Person], &[T::Organization]),
        )
        .relation(
            Rel::new("EMPLOYED_BY", r"\b(?:hired|employs|appointed|recruited)\b", 0.8)
                .between(&[T::Person], &[T::Organization])
                .inverse(),
        )
        .relation(
            Rel::new(
                "LOCATED_IN",
                r"\b(?:based\s+in|located\s+in|headquartered\s+in|lives\s+in|resides\s+in|offices?\s+in|in)\b",
                0.7,
            )
            .between(&[T::Person, T::Organization], &[T::Location]),
        )
        .relation(
            Rel::new(
                "OCCURRED_ON",
                r"\b(?:on|dated|effective|as\s+of|since|until|signed|in)\b",
                0.6,
            )
            .between(&[], &[T::Date]),
        )
        .relation(
            Rel::new(
                "HAS_VALUE",
                r"\b(?:paid|pays|received|worth|valued\s+at|for|of|totaling|totalling|amounting\s+to|fined|awarded|increased\s+by|decreased\s+by|rose|fell)\b",
                0.6,
            )
            .between(&[], &[T::Money, T::Percentage]),
        )
        .relation(
            Rel::new(
                "HAS_ROLE",
                r"(?:^,\s*(?:the\s+|our\s+)?$|\b(?:is|was|as|serves\s+as|served\s+as|became|named)\s+(?:the\s+|an?\s+)?$)",
                0.7,
            )
            .between(&[T::Person], &[T::Role]),
        )
        .relation(
            Rel::new("HAS_ROLE", r"^\s*$", 0.65)
                .between(&[T::Person], &[T::Role])
                .inverse(),
        )
}

// ============================================================================
// Specialized domains
// ============================================================================

pub fn specialized_domains() -> Vec<DomainSpec> {
    vec![legal_domain(), medical_domain(), business_domain()]
}

pub fn legal_domain() -> DomainSpec {
    DomainSpec::new("legal")
        .expects(&[
            T::Person,
            T::Organization,
            T::Date,
            T::Statute,
            T::Court,
            T::CaseCitation,
        ])
        .entity(
            T::Statute,
            r"(?:§{1,2}\s*\d+[A-Za-z]?(?:\([0-9A-Za-z]+\))*|\b(?:Section|Article|Rule|Title)\s+\d+[A-Za-z]?(?:\([0-9A-Za-z]+\))*)",
            0.9,
        )
        .entity(
            T::Statute,
            r"\b(?:[A-Z][a-z]+\s+){1,6}(?:Act|Code|Regulation|Statute)(?:\s+of\s+\d{4})?\b",
            0.85,
        )
        .entity(
            T::Court,
            r"\b(?:(?:U\.S\.\s+|United\s+States\s+)?Supreme\s+Court|Courts?\s+of\s+Appeals?|(?:U\.S\.\s+)?District\s+Court|High\s+Court|Court\s+of\s+Justice|Circuit\s+Court|Tribunal)(?:\s+(?:of|for)\s+(?:the\s+)?[A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)?",
            0.9,
        )
        .entity(
            T::CaseCitation,
            r"\b[A-Z][A-Za-z&'-]*(?:\s+[A-Z][A-Za-z&'-]*)*\s+v\.?\s+[A-Z][A-Za-z&'-]*(?:\s+[A-Z][A-Za-z&'-]*)*",
            0.85,
        )
        .entity(
            T::Role,
            r"(?i:\b(?:plaintiffs?|defendants?|appellants?|appellees?|respondents?|petitioners?|counsel|licensee|licensor|lessee|lessor|tenant|landlord)\b)",
            0.8,
        )
        .relation(
            Rel::new(
                "GOVERNED_BY",
                r"\b(?:under|pursuant\s+to|in\s+accordance\s+with|governed\s+by|subject\s+to|violat(?:ed|es|ing|ion\s+of)|breach(?:ed)?\s+of|as\s+defined\s+in)\b",
                0.8,
            )
            .between(&[], &[T::Statute]),
        )
        .relation(
            Rel::new(
                "DECIDED_BY",
                r"\b(?:was\s+decided\s+(?:by|in)|decided\s+by|heard\s+(?:by|in)|before\s+the|in\s+the)\b",
                0.8,
            )
            .between(&[T::CaseCitation], &[T::Court]),
        )
        .relation(
            Rel::new("DECIDED_BY", r"\b(?:ruled\s+in|decided|held\s+in|in)\b", 0.7)
                .between(&[T::CaseCitation], &[T::Court])
                .inverse(),
        )
        .relation(
            Rel::new(
                "SUED",
                r"\b(?:sued|filed\s+(?:suit|a\s+(?:complaint|lawsuit))\s+against|brought\s+(?:an\s+)?action\s+against)\b",
                0.75,
            )
            .between(
                &[T::Person, T::Organization],
                &[T::Person, T::Organization],
            ),
        )
}

pub fn medical_domain() -> DomainSpec {
    DomainSpec::new("medical")
        .expects(&[
            T::Person,
            T::Condition,
            T::Medication,
            T::Dosage,
            T::Procedure,
        ])
        .entity(
            T::Condition,
            r"(?i:\b(?:type\s+[12]\s+diabetes|diabetes(?:\s+mellitus)?|hypertension|hypotension|asthma|pneumonia|bronchitis|influenza|covid-19|cancer|carcinoma|leukemia|arthritis|migraine|depression|anxiety|sepsis|stroke|myocardial\s+infarction|heart\s+failure|atrial\s+fibrillation|copd|obesity|anemia|hepatitis(?:\s+[a-c])?|tuberculosis|fracture)\b)",
            0.85,
        )
        .entity(
            T::Medication,
            r"(?i:\b(?:metformin|insulin|aspirin|ibuprofen|acetaminophen|paracetamol|lisinopril|amlodipine|atorvastatin|simvastatin|amoxicillin|azithromycin|warfarin|heparin|prednisone|albuterol|omeprazole|levothyroxine|losartan|morphine|sertraline|fluoxetine)\b)",
            0.85,
        )
        .entity(
            T::Dosage,
            r"\b\d+(?:\.\d+)?\s?(?:mg|mcg|g|ml|mL|IU|units?)\b(?:\s+(?:once|twice|three\s+times)\s+(?:daily|a\s+day|weekly)\b)?",
            0.9,
        )
        .entity(
            T::Procedure,
            r"(?i:\b(?:surgery|biopsy|mri|ct\s+scan|x-ray|ultrasound|echocardiogram|colonoscopy|endoscopy|angioplasty|appendectomy|chemotherapy|radiotherapy|dialysis|transplant|vaccination|blood\s+test)\b)",
            0.85,
        )
        .entity(
            T::Person,
            r"\b[Pp]atient\s+(?P<span>[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)",
            0.8,
        )
        .relation(
            Rel::new(
                "TREATED_WITH",
                r"\b(?:treated\s+with|managed\s+with|responds?\s+to|controlled\s+(?:with|by))\b",
                0.8,
            )
            .between(&[T::Condition], &[T::Medication, T::Procedure]),
        )
        .relation(
            Rel::new(
                "TREATED_WITH",
                r"\b(?:for|treats?|to\s+treat|treating|manages?|to\s+manage|against|indicated\s+for)\b",
                0.75,
            )
            .between(&[T::Condition], &[T::Medication, T::Procedure])
            .inverse(),
        )
        .relation(
            Rel::new(
                "PRESCRIBED",
                r"\b(?:was\s+prescribed|prescribed|started\s+on|takes?|taking|receiv(?:es|ed|ing)|administered|given)\b",
                0.75,
            )
            .between(&[T::Person], &[T::Medication]),
        )
        .relation(
            Rel::new(
                "DIAGNOSED_WITH",
                r"\b(?:was\s+diagnosed\s+with|diagnosed\s+with|suffers?\s+from|suffering\s+from|presented\s+with|history\s+of|has|had)\b",
                0.8,
            )
            .between(&[T::Person], &[T::Condition]),
        )
        .relation(
            Rel::new("HAS_DOSAGE", r"^\s*(?:at\s+|,\s*|of\s+)?$", 0.9)
                .between(&[T::Medication], &[T::Dosage]),
        )
        .relation(
            Rel::new(
                "UNDERWENT",
                r"\b(?:underwent|undergo(?:es)?|scheduled\s+for|received|had)\b",
                0.8,
            )
            .between(&[T::Person], &[T::Procedure]),
        )
}

pub fn business_domain() -> DomainSpec {
    DomainSpec::new("business")
        .expects(&[
            T::Person,
            T::Organization,
            T::Money,
            T::Date,
            T::Role,
            T::Product,
        ])
        .entity(
            T::Date,
            r"\b(?:Q[1-4]\s+(?:FY)?\d{2,4}|FY\s?\d{2,4}|[Ff]iscal\s+(?:[Yy]ear\s+)?\d{4})\b",
            0.85,
        )
        .entity(
            T::Product,
            r"\b[A-Z][\w-]*(?:\s+[A-Z][\w-]*)?\s+(?:Platform|Suite|Cloud|Pro|Max|OS|App|Service)\b",
            0.7,
        )
        .entity(
            T::Role,
            r"\b(?:Chief\s+(?:Executive|Financial|Technology|Operating|Marketing)\s+Officer|General\s+Counsel|Board\s+Member|Managing\s+Director|Vice\s+President|Head\s+of\s+[A-Z][a-z]+)\b",
            0.8,
        )
        // Object-first phrasings are listed before their forward prefixes.
        .relation(
            Rel::new(
                "ACQUIRED",
                r"\b(?:was\s+acquired\s+by|acquired\s+by|sold\s+to|was\s+bought\s+by)\b",
                0.85,
            )
            .between(&[T::Organization], &[T::Organization])
            .inverse(),
        )
        .relation(
            Rel::new(
                "ACQUIRED",
                r"\b(?:acquired|acquires|bought|buys|purchased|took\s+over|merged\s+with|agreed\s+to\s+acquire)\b",
                0.85,
            )
            .between(&[T::Organization], &[T::Organization]),
        )
        .relation(
            Rel::new(
                "PARTNERED_WITH",
                r"\b(?:partnered\s+with|signed\s+(?:an?\s+)?(?:agreement|deal|contract)\s+with|in\s+partnership\s+with|teamed\s+up\s+with)\b",
                0.75,
            )
            .between(&[T::Organization], &[T::Organization]),
        )
        .relation(
            Rel::new(
                "LEADS",
                r"\b(?:founded\s+by|co-founded\s+by|led\s+by|headed\s+by|run\s+by|chaired\s+by)\b",
                0.8,
            )
            .between(&[T::Person], &[T::Organization])
            .inverse(),
        )
        .relation(
            Rel::new(
                "LEADS",
                r"\b(?:founded|co-founded|leads|led|runs|ran|heads|headed|chairs|chaired|is\s+(?:the\s+)?(?:CEO|CFO|CTO|COO|founder|chairman|president)\s+of)\b",
                0.8,
            )
            .between(&[T::Person], &[T::Organization]),
        )
        .relation(
            Rel::new(
                "REPORTED",
                r"\b(?:reported|posted|announced|generated|earned|raised|revenue\s+of|profit\s+of|lost)\b",
                0.75,
            )
            .between(&[T::Organization], &[T::Money, T::Percentage]),
        )
        .relation(
            Rel::new(
                "PRODUCES",
                r"\b(?:launched|released|makes|develops|developed|introduced|sells|unveiled)\b",
                0.75,
            )
            .between(&[T::Organization], &[T::Product]),
        )
}
