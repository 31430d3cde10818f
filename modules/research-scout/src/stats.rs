/// Counts for one expanded query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryStats {
    pub query: String,
    pub urls_found: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Results attributed to this query by the URL mapping (last writer wins).
    /// A URL surfaced by two queries yields a row per query, and every such
    /// row is counted under the later query.
    pub results: usize,
}

/// Stats from a research run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub base_query: String,
    pub queries: Vec<QueryStats>,
    pub summaries_generated: usize,
    pub summaries_defaulted: usize,
    pub cancelled: bool,
}

impl RunStats {
    pub fn processed(&self) -> usize {
        self.queries.iter().map(|q| q.urls_found).sum()
    }

    pub fn succeeded(&self) -> usize {
        self.queries.iter().map(|q| q.succeeded).sum()
    }

    pub fn failed(&self) -> usize {
        self.queries.iter().map(|q| q.failed).sum()
    }
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Research Run Complete ===")?;
        writeln!(f, "Query:              {}", self.base_query)?;
        writeln!(f, "Queries processed:  {}", self.queries.len())?;
        writeln!(f, "URLs processed:     {}", self.processed())?;
        writeln!(f, "Successful:         {}", self.succeeded())?;
        writeln!(f, "Failed:             {}", self.failed())?;
        if self.summaries_generated + self.summaries_defaulted > 0 {
            writeln!(f, "Summaries:          {}", self.summaries_generated)?;
            writeln!(f, "Empty summaries:    {}", self.summaries_defaulted)?;
        }
        if self.cancelled {
            writeln!(f, "Run was cancelled before completion")?;
        }
        writeln!(f, "\nResults by query:")?;
        for q in &self.queries {
            writeln!(f, "  \"{}\": {} results", q.query, q.results)?;
        }
        Ok(())
    }
}
