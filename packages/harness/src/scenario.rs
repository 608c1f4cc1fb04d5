use mocks::Upstream;

/// A named configuration of the orders test run.
///
/// Every scenario starts the database and the service; they differ in which
/// upstream services are replaced by mock fixture servers, and in how long
/// the service is given to come up.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct Scenario {
    pub name: &'static str,

    /// Upstreams to start as mock fixture servers.
    pub mocks: &'static [Upstream],

    /// Default readiness retry budget.
    pub retries: u32,
}

impl Scenario {
    /// Only the database; upstream calls made by the service go nowhere.
    pub const DATABASE_ONLY: Scenario = Scenario {
        name: "database_only",
        mocks: &[],
        retries: 10,
    };

    /// Accounts, carts and payment are mocked.
    pub const UPSTREAM_MOCKS: Scenario = Scenario {
        name: "upstream_mocks",
        mocks: &[Upstream::Accounts, Upstream::Carts, Upstream::Payment],
        retries: 20,
    };

    /// Every upstream the service talks to is mocked.
    pub const ALL_UPSTREAMS: Scenario = Scenario {
        name: "all_upstreams",
        mocks: &[
            Upstream::Accounts,
            Upstream::Carts,
            Upstream::Payment,
            Upstream::Shipping,
        ],
        retries: 30,
    };

    /// Every known scenario.
    pub const ALL: [Scenario; 3] = [
        Scenario::DATABASE_ONLY,
        Scenario::UPSTREAM_MOCKS,
        Scenario::ALL_UPSTREAMS,
    ];

    /// Select the scenarios whose name contains any of the filters.
    ///
    /// No filters selects every scenario.
    pub fn select(filters: &[impl AsRef<str>]) -> Vec<Scenario> {
        Self::ALL
            .into_iter()
            .filter(|scenario| {
                filters.is_empty()
                    || filters
                        .iter()
                        .any(|filter| scenario.name.contains(filter.as_ref()))
            })
            .collect()
    }
}
