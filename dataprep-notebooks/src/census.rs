//! New Zealand census: age and sex by ethnic group, 2006 to 2018

use std::path::Path;

use anyhow::Context;
use tracing::info;

use dataprep_core::{
    col, lit, ColumnType, FileFormat, JoinKind, LazyQuery, Reducer, Result, SchemaHint, SortKey,
};
use dataprep_duckdb::open_session;
use dataprep_readers::{ensure_extracted, Fetcher, Loader};

use crate::{show, NotebookConfig};

/// Published archive with the data table and its lookup tables
pub const ARCHIVE_URL: &str = "https://www3.stats.govt.nz/2018census/Age-sex-by-ethnic-group-grouped-total-responses-census-usually-resident-population-counts-2006-2013-2018-Censuses-RC-TA-SA2-DHB.zip";

/// Fact table member of the archive
pub const DATA_MEMBER: &str = "Data8277.csv";

/// Lookup table members, by dimension
pub const ETHNIC_LOOKUP: &str = "DimenLookupEthnic8277.csv";
/// Sex lookup member
pub const SEX_LOOKUP: &str = "DimenLookupSex8277.csv";
/// Area lookup member
pub const AREA_LOOKUP: &str = "DimenLookupArea8277.csv";

/// Code of the all-ages total
pub const TOTAL_AGE: &str = "999999";
/// Code of the both-sexes total
pub const TOTAL_SEX: &str = "9";
/// Code of the all-ethnicities total
pub const TOTAL_ETHNIC: &str = "9999";
/// Code of the whole-country total
pub const TOTAL_AREA: &str = "9999";

/// Declared types of the fact table. Codes keep their leading zeros and
/// suppressed counts ("..C") read as missing.
pub fn data_hint() -> SchemaHint {
    SchemaHint::new()
        .column("Year", ColumnType::Integer)
        .column("Age", ColumnType::Categorical)
        .column("Ethnic", ColumnType::Categorical)
        .column("Sex", ColumnType::Categorical)
        .column("Area", ColumnType::Categorical)
        .column("count", ColumnType::Integer)
}

/// Declared types of a lookup table
pub fn lookup_hint() -> SchemaHint {
    SchemaHint::new()
        .column("Code", ColumnType::Categorical)
        .column("Description", ColumnType::String)
        .column("SortOrder", ColumnType::Integer)
}

/// National counts per ethnic group in `year`, largest first
pub fn ethnic_groups(data: &LazyQuery, ethnic: &LazyQuery, year: i64) -> Result<LazyQuery> {
    data.filter(
        col("Year")
            .eq(lit(year))
            .and(col("Age").eq(lit(TOTAL_AGE)))
            .and(col("Sex").eq(lit(TOTAL_SEX)))
            .and(col("Area").eq(lit(TOTAL_AREA))),
    )?
    .join(ethnic, &[("Ethnic", "Code")], JoinKind::Inner)?
    .select(&["Description", "count"])?
    .rename("Description", "ethnic_group")?
    .sort(vec![SortKey::desc("count")])
}

/// National population by sex and census year
pub fn population_by_sex(data: &LazyQuery, sex: &LazyQuery) -> Result<LazyQuery> {
    data.filter(
        col("Age")
            .eq(lit(TOTAL_AGE))
            .and(col("Ethnic").eq(lit(TOTAL_ETHNIC)))
            .and(col("Area").eq(lit(TOTAL_AREA)))
            .and(col("Sex").not_eq(lit(TOTAL_SEX))),
    )?
    .join(sex, &[("Sex", "Code")], JoinKind::Inner)?
    .aggregate(&["Year", "Description"], vec![Reducer::sum("count", "population")])?
    .rename("Description", "sex")?
    .sort(vec![SortKey::asc("Year"), SortKey::asc("sex")])
}

/// Number of fact rows whose count was suppressed, per year
pub fn suppressed_counts_sql(table: &str) -> String {
    format!(
        "SELECT \"Year\", COUNT(*) AS \"rows\", COUNT(*) - COUNT(\"count\") AS \"suppressed\" \
         FROM \"{table}\" GROUP BY \"Year\" ORDER BY \"Year\""
    )
}

/// Download, extract, load and explore the census tables
pub fn run(config: &NotebookConfig) -> anyhow::Result<()> {
    let census_dir = config.data_dir.join("census");
    let archive = census_dir.join("census-8277.zip");

    let fetcher = Fetcher::http(&config.fetch)?;
    fetcher
        .ensure_local(ARCHIVE_URL, &archive)
        .context("downloading the census archive")?;

    let extract = |member: &str| -> anyhow::Result<_> {
        ensure_extracted(&archive, member, &census_dir).with_context(|| format!("extracting {member}"))
    };
    let data_path = extract(DATA_MEMBER)?;
    let ethnic_path = extract(ETHNIC_LOOKUP)?;
    let sex_path = extract(SEX_LOOKUP)?;
    let area_path = extract(AREA_LOOKUP)?;

    let loader = Loader::new(config.csv);
    let data = loader.load_with("census", &data_path, FileFormat::Csv, &data_hint())?;
    let load_lookup = |name: &str, path: &Path| loader.load_with(name, path, FileFormat::Csv, &lookup_hint());
    let ethnic = load_lookup("ethnic", &ethnic_path)?;
    let sex = load_lookup("sex", &sex_path)?;
    let area = load_lookup("area", &area_path)?;
    info!(columns = %data.schema(), "census fact table");

    let session = open_session(config.session.clone())?;
    let preview_rows = config.session.preview_rows;

    let census = session.table(&data)?;
    show("Census fact table", &census.preview(preview_rows)?);

    let areas = session.table(&area)?;
    show("Area lookup", &areas.preview(preview_rows)?);

    let ethnic_table = session.table(&ethnic)?;
    show("Ethnic groups, 2018", &ethnic_groups(&census, &ethnic_table, 2018)?.preview(preview_rows)?);

    let sex_table = session.table(&sex)?;
    show("Population by sex", &population_by_sex(&census, &sex_table)?.collect()?);

    show(
        "Suppressed counts per year",
        &session.sql_preview(&suppressed_counts_sql(data.name()), preview_rows)?,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataprep_core::{SessionConfig, Value};
    use std::fs;
    use test_case::test_case;

    const DATA: &str = "\
Year,Age,Ethnic,Sex,Area,count
2018,999999,1,9,9999,3000
2018,999999,2,9,9999,..C
2018,999999,3,9,9999,800
2013,999999,1,9,9999,2900
2018,999999,9999,1,9999,2400
2018,999999,9999,2,9999,2500
2013,999999,9999,1,9999,2300
2013,999999,9999,2,9999,2350
2018,999999,9999,1,01,120
";

    const ETHNIC: &str = "Code,Description,SortOrder\n1,European,1\n2,Maori,2\n3,Pacific Peoples,3\n9999,Total people,4\n";
    const SEX: &str = "Code,Description,SortOrder\n1,Male,1\n2,Female,2\n9,Total people - sex,3\n";

    fn fixture(dir: &Path) -> (LazyQuery, LazyQuery, LazyQuery) {
        let write = |file: &str, content: &str| {
            let path = dir.join(file);
            fs::write(&path, content).unwrap();
            path
        };
        let loader = Loader::default();
        let data = loader
            .load_with("census", &write(DATA_MEMBER, DATA), FileFormat::Csv, &data_hint())
            .unwrap();
        let ethnic = loader
            .load_with("ethnic", &write(ETHNIC_LOOKUP, ETHNIC), FileFormat::Csv, &lookup_hint())
            .unwrap();
        let sex = loader
            .load_with("sex", &write(SEX_LOOKUP, SEX), FileFormat::Csv, &lookup_hint())
            .unwrap();

        let session = open_session(SessionConfig::default()).unwrap();
        (
            session.table(&data).unwrap(),
            session.table(&ethnic).unwrap(),
            session.table(&sex).unwrap(),
        )
    }

    #[test_case("Year", ColumnType::Integer ; "year stays numeric")]
    #[test_case("Area", ColumnType::Categorical ; "area keeps leading zeros")]
    #[test_case("Ethnic", ColumnType::Categorical ; "ethnic code matches lookup")]
    #[test_case("count", ColumnType::Integer ; "suppressed counts still integer")]
    fn test_declared_fact_types(column: &str, expected: ColumnType) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DATA_MEMBER);
        fs::write(&path, DATA).unwrap();

        let data = Loader::default()
            .load_with("census", &path, FileFormat::Csv, &data_hint())
            .unwrap();
        assert_eq!(data.schema().field_by_name(column).unwrap().column_type(), expected);
    }

    #[test]
    fn test_ethnic_groups_sorted_with_suppressed_last() {
        let dir = tempfile::tempdir().unwrap();
        let (data, ethnic, _) = fixture(dir.path());

        let table = ethnic_groups(&data, &ethnic, 2018).unwrap().collect().unwrap();
        assert_eq!(table.columns(), &["ethnic_group".to_string(), "count".to_string()]);
        assert_eq!(
            table.rows(),
            &[
                vec![Value::from("European"), Value::Integer(3000)],
                vec![Value::from("Pacific Peoples"), Value::Integer(800)],
                vec![Value::from("Maori"), Value::Missing],
            ]
        );
    }

    #[test]
    fn test_population_by_sex() {
        let dir = tempfile::tempdir().unwrap();
        let (data, _, sex) = fixture(dir.path());

        let table = population_by_sex(&data, &sex).unwrap().collect().unwrap();
        assert_eq!(
            table.rows(),
            &[
                vec![Value::Integer(2013), Value::from("Female"), Value::Integer(2350)],
                vec![Value::Integer(2013), Value::from("Male"), Value::Integer(2300)],
                vec![Value::Integer(2018), Value::from("Female"), Value::Integer(2500)],
                vec![Value::Integer(2018), Value::from("Male"), Value::Integer(2400)],
            ]
        );
    }

    #[test]
    fn test_suppressed_counts_sql() {
        let dir = tempfile::tempdir().unwrap();
        let (data, _, _) = fixture(dir.path());

        let rows = data
            .filter(col("Year").eq(lit(2018)))
            .unwrap()
            .aggregate(&[], vec![Reducer::count("rows"), Reducer::count_non_missing("count", "present")])
            .unwrap()
            .collect()
            .unwrap();
        assert_eq!(rows.rows(), &[vec![Value::Integer(6), Value::Integer(5)]]);
        assert!(suppressed_counts_sql("census").contains("FROM \"census\""));
    }
}
