//! Built-in clinical text examples for `--example` and `--list-examples`.

/// A named clinical description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub name: &'static str,
    pub text: &'static str,
}

const SAMPLES: &[Sample] = &[
    Sample {
        name: "screening_simple",
        text: "45-year-old female, routine screening mammography. No family history of breast cancer. No current symptoms.",
    },
    Sample {
        name: "diagnostic_detailed",
        text: "52-year-old female with palpable lump in left breast, upper outer quadrant. \
               Family history of breast cancer in mother (age 65). Patient reports pain and tenderness. \
               Lump first noticed 2 weeks ago, approximately 2cm in size. No nipple discharge. \
               Previous mammography 1 year ago was normal.",
    },
    Sample {
        name: "high_risk_comprehensive",
        text: "38-year-old female with BRCA1 mutation. Strong family history of breast and ovarian cancer. \
               Mother diagnosed with breast cancer at age 42, maternal grandmother with ovarian cancer at age 58. \
               Sister diagnosed with breast cancer at age 35. Patient reports breast pain and palpable mass in right breast. \
               Currently on annual screening protocol with mammography and MRI. Last MRI 6 months ago showed no abnormalities.",
    },
    Sample {
        name: "structured_medical",
        text: "PATIENT INFORMATION:\n\
               - Age: 50 years\n\
               - Gender: Female\n\
               \n\
               CLINICAL PRESENTATION:\n\
               - Chief Complaint: Routine screening mammography\n\
               - Symptoms: None\n\
               \n\
               FAMILY HISTORY:\n\
               - Mother: Breast cancer at age 65\n\
               - Maternal aunt: Breast cancer at age 58\n\
               \n\
               PERSONAL HISTORY:\n\
               - Previous biopsies: 1 (benign, 3 years ago)\n\
               - Hormone replacement therapy: None\n\
               - Menopausal status: Post-menopausal\n\
               \n\
               RISK FACTORS:\n\
               - Age > 50\n\
               - Family history of breast cancer\n\
               - Previous breast biopsy",
    },
    Sample {
        name: "urgent_case",
        text: "55-year-old female presents with rapidly growing breast mass. \
               Mass first noticed 3 months ago, now 4cm in size. Associated with skin changes and nipple retraction. \
               Strong family history: mother and sister both diagnosed with breast cancer before age 50. \
               Patient reports weight loss and fatigue over past month. \
               Previous mammography 2 years ago showed dense breasts but no masses.",
    },
    Sample {
        name: "follow_up_case",
        text: "48-year-old female returns for follow-up mammography. \
               Previous mammography 6 months ago showed BI-RADS category 3 finding in left breast. \
               Patient reports no new symptoms. No family history of breast cancer. \
               Previous biopsy 2 years ago was benign. Patient is post-menopausal.",
    },
    Sample {
        name: "genetic_risk_case",
        text: "35-year-old female with known BRCA2 mutation. \
               Strong family history: mother (breast cancer, age 45), maternal grandmother (ovarian cancer, age 60), \
               paternal aunt (breast cancer, age 50). Patient is pre-menopausal. \
               Currently on enhanced screening protocol. No current symptoms. \
               Last MRI 3 months ago was normal.",
    },
    Sample {
        name: "minimal_info",
        text: "50-year-old female, routine screening.",
    },
    Sample {
        name: "complex_case",
        text: "60-year-old female with multiple risk factors. \
               Personal history of breast cancer 5 years ago (left breast, stage 1, treated with lumpectomy and radiation). \
               Family history: mother (breast cancer, age 70), sister (ovarian cancer, age 55). \
               Currently on tamoxifen. Patient reports new lump in right breast. \
               Previous mammography 1 year ago showed post-treatment changes but no new abnormalities.",
    },
    Sample {
        name: "young_patient",
        text: "28-year-old female with strong family history of breast cancer. \
               Mother diagnosed at age 35, maternal grandmother at age 45. \
               Patient reports breast pain and lump in right breast. \
               No previous mammography. Patient is pre-menopausal, nulliparous. \
               No known genetic mutations (testing pending).",
    },
];

/// All built-in samples, in listing order.
pub fn all() -> &'static [Sample] {
    SAMPLES
}

/// Look up a sample by name. Dashes and case are ignored.
pub fn find(name: &str) -> Option<&'static Sample> {
    let wanted = name.trim().to_lowercase().replace('-', "_");
    SAMPLES.iter().find(|s| s.name == wanted)
}

/// Comma-separated sample names, for error messages.
pub fn names() -> String {
    SAMPLES.iter().map(|s| s.name).collect::<Vec<_>>().join(", ")
}
