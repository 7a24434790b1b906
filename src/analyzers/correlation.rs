use crate::analyzers::types::CorrelationMatrix;
use crate::analyzers::utility::pearson;
use crate::questions::QUANTITATIVE;
use crate::table::Table;
use tracing::debug;

/// Pairwise Pearson correlation between the quantitative questions present
/// in `table`.
///
/// Each pair uses only the rows answering both questions. Coefficients are
/// missing when fewer than two such rows exist or a side is constant.
pub fn correlation_analysis(table: &Table) -> CorrelationMatrix {
    let columns = table.present_columns(QUANTITATIVE);
    let series: Vec<Vec<Option<f64>>> = columns
        .iter()
        .map(|name| {
            table
                .column(name)
                .map(|cells| cells.map(|c| c.as_int().map(|v| v as f64)).collect())
                .unwrap_or_default()
        })
        .collect();

    let n = columns.len();
    let mut values = vec![vec![None; n]; n];
    for i in 0..n {
        for j in i..n {
            let pairs: Vec<(f64, f64)> = series[i]
                .iter()
                .zip(&series[j])
                .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
                .collect();
            let r = pearson(&pairs);
            values[i][j] = r;
            values[j][i] = r;
        }
    }

    debug!(questions = n, "Correlation matrix computed");
    CorrelationMatrix { columns, values }
}
