//! Built-in source list: a baseline of curated guidance that is always
//! available, plus the agency pages worth scraping on top of it.

use crate::models::{Category, SourceSpec};

const STARTING_STEPS: &str = "\
Choose a business structure such as a sole proprietorship, LLC, or corporation. \
File a business license application with the Department of Revenue to receive a \
Unified Business Identifier (UBI) number. Register a trade name if you will \
operate under a name other than your own. Check with your city and county for \
local licenses and zoning requirements. If you will hire employees, set up \
workers' compensation coverage and unemployment insurance, and report new hires \
to the state.";

const LICENSE_REQUIREMENTS: &str = "\
Most Washington businesses need a state business license if they meet any of \
the following: gross income over 12,000 dollars per year, doing business under \
a name other than the owner's legal name, planning to hire employees within 90 \
days, selling a product or service subject to sales tax, or needing specialty \
endorsements. Apply through the Department of Revenue business licensing \
service. Processing typically takes about 10 business days, longer when city or \
specialty endorsements are involved.";

const WAGE_BASICS: &str = "\
Washington's minimum wage applies to most workers age 16 and older and is \
adjusted each year for inflation by the Department of Labor and Industries. \
Employers must pay at least the state minimum wage, and some cities, including \
Seattle and SeaTac, set higher local minimums. Overtime at one and a half times \
the regular rate is due after 40 hours in a workweek for most hourly workers. \
Employers must also provide paid sick leave accruing at a minimum of one hour \
per 40 hours worked.";

/// Curated knowledge present even before any page or PDF is ingested.
pub fn seed_sources() -> Vec<SourceSpec> {
    vec![
        SourceSpec::seed(
            "seed-starting-steps",
            "Steps to start a business in Washington",
            STARTING_STEPS,
            Category::Steps,
        ),
        SourceSpec::seed(
            "seed-license-requirements",
            "When a Washington business license is required",
            LICENSE_REQUIREMENTS,
            Category::Licensing,
        ),
        SourceSpec::seed(
            "seed-wage-basics",
            "Washington minimum wage and overtime basics",
            WAGE_BASICS,
            Category::Wages,
        ),
    ]
}

/// Seeds plus the default set of agency pages to scrape.
pub fn default_sources() -> Vec<SourceSpec> {
    let mut sources = seed_sources();
    sources.extend([
        SourceSpec::page("https://business.wa.gov/run", Category::Guidance),
        SourceSpec::page(
            "https://dor.wa.gov/open-business/apply-business-license",
            Category::Licensing,
        ),
        SourceSpec::page(
            "https://lni.wa.gov/workers-rights/wages/minimum-wage/",
            Category::Wages,
        ),
    ]);
    sources
}
