//! # VASP 计算器
//!
//! 把一个原子结构交给 VASP 计算并读回结果：
//!
//! 1. 清空旧结果并检查结构（满秩晶胞、全周期）
//! 2. 解析启动命令，按元素排序后写出 POSCAR/INCAR/KPOINTS/POTCAR 与排序文件
//! 3. 在工作目录中同步运行 VASP
//! 4. 离子弛豫时从 CONTCAR 更新结构
//! 5. 读取 vasprun.xml 与 OUTCAR，按调用方顺序还原各原子数组
//!
//! 每个计算器对应一个工作目录，状态见 [`CalcState`]。
//!
//! ## 依赖关系
//! - 被 `commands/` 使用
//! - 使用 `config.rs`, `models/`, `parsers/`
//! - 子模块: sort, state, runner, export

pub mod export;
pub mod runner;
pub mod sort;
pub mod state;

pub use export::CalculatorState;
pub use runner::{Launcher, ShellLauncher, TxtOutput};
pub use sort::{SortIndex, SORT_FILE};
pub use state::{CalcState, SystemChange};

use crate::config::{self, CommandConfig};
use crate::error::{Result, VaspError};
use crate::models::{CalcResults, ParamValue, Structure, VaspParams};
use crate::parsers::outcar::{self, LdauInfo};
use crate::parsers::vasprun::{self, VasprunData};
use crate::parsers::{incar, kpoints, poscar, potcar};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 计算失败时报告的程序名
const PROGRAM: &str = "vasp";

/// 读取结果时遇到的非致命问题
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadWarning {
    /// LORBIT < 10，OUTCAR 中没有原子磁矩
    MagmomsNotWritten,
    /// OUTCAR 中找不到 `magnetization (x)` 块
    MagnetizationMissing,
}

impl fmt::Display for ReadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadWarning::MagmomsNotWritten => write!(
                f,
                "Magnetic moment data not written in OUTCAR (LORBIT<10), setting magnetic moments to zero. Set LORBIT>=10 to get information on magnetic moments"
            ),
            ReadWarning::MagnetizationMissing => write!(
                f,
                "No magnetization block found in OUTCAR, setting magnetic moments to zero"
            ),
        }
    }
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String>>;

/// VASP 计算器
pub struct Vasp {
    directory: PathBuf,
    config: CommandConfig,
    pp_path: Option<PathBuf>,
    env: EnvLookup,
    launcher: Box<dyn Launcher>,
    txt: TxtOutput,
    tolerance: f64,

    params: VaspParams,
    /// 上次读取结果时的参数
    snapshot: VaspParams,
    /// 上次使用的结构（调用方顺序）
    structure: Option<Structure>,
    sort: Option<SortIndex>,

    results: CalcResults,
    state: CalcState,
    version: Option<String>,
    xml: Option<VasprunData>,
    warnings: Vec<ReadWarning>,
}

impl fmt::Debug for Vasp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vasp")
            .field("directory", &self.directory)
            .field("config", &self.config)
            .field("state", &self.state)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Vasp {
    /// 在 `directory` 中工作的计算器
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Vasp {
            directory: directory.into(),
            config: CommandConfig::default(),
            pp_path: None,
            env: Box::new(config::system_env),
            launcher: Box::new(ShellLauncher),
            txt: TxtOutput::default(),
            tolerance: state::DEFAULT_TOLERANCE,
            params: VaspParams::new(),
            snapshot: VaspParams::new(),
            structure: None,
            sort: None,
            results: CalcResults::default(),
            state: CalcState::Empty,
            version: None,
            xml: None,
            warnings: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: CommandConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.config.command = Some(command.into());
        self
    }

    /// 赝势库根目录，未设置时使用 `VASP_PP_PATH`
    pub fn with_pp_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.pp_path = Some(path.into());
        self
    }

    /// 替换环境变量查询
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + 'static,
    {
        self.env = Box::new(lookup);
        self
    }

    pub fn with_launcher<L: Launcher + 'static>(mut self, launcher: L) -> Self {
        self.launcher = Box::new(launcher);
        self
    }

    pub fn with_txt(mut self, txt: TxtOutput) -> Self {
        self.txt = txt;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_params(mut self, params: VaspParams) -> Self {
        self.params = params;
        self
    }

    // ─────────────────────────────────────────────────────────
    // 访问器
    // ─────────────────────────────────────────────────────────

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn params(&self) -> &VaspParams {
        &self.params
    }

    pub fn structure(&self) -> Option<&Structure> {
        self.structure.as_ref()
    }

    pub fn sort_index(&self) -> Option<&SortIndex> {
        self.sort.as_ref()
    }

    pub fn state(&self) -> CalcState {
        self.state
    }

    pub fn results(&self) -> &CalcResults {
        &self.results
    }

    pub fn warnings(&self) -> &[ReadWarning] {
        &self.warnings
    }

    /// OUTCAR 中的 VASP 版本
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn energy(&self) -> Option<f64> {
        self.results.energy
    }

    pub fn free_energy(&self) -> Option<f64> {
        self.results.free_energy
    }

    pub fn forces(&self) -> Option<&[[f64; 3]]> {
        self.results.forces.as_deref()
    }

    pub fn stress(&self) -> Option<[f64; 6]> {
        self.results.stress
    }

    pub fn converged(&self) -> Option<bool> {
        self.results.converged
    }

    // ─────────────────────────────────────────────────────────
    // 参数与结构
    // ─────────────────────────────────────────────────────────

    /// 设置参数，值发生变化时旧结果失效
    pub fn set(&mut self, key: &str, value: impl Into<ParamValue>) -> Result<()> {
        let before = self.params.get(key).cloned();
        self.params.set(key, value)?;
        if self.params.get(key) != before.as_ref() {
            self.invalidate();
        }
        Ok(())
    }

    /// 批量设置参数
    pub fn update_params<I, K>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, ParamValue)>,
        K: AsRef<str>,
    {
        for (key, value) in values {
            self.set(key.as_ref(), value)?;
        }
        Ok(())
    }

    /// 换一个结构，有变化时旧结果失效
    pub fn set_structure(&mut self, structure: &Structure) {
        if !self.check_state(structure).is_empty() {
            self.invalidate();
        }
        self.structure = Some(structure.clone());
    }

    /// 相对上次计算的变化
    pub fn check_state(&self, structure: &Structure) -> Vec<SystemChange> {
        let mut changes =
            state::structure_changes(self.structure.as_ref(), structure, self.tolerance);
        changes.extend(state::parameter_changes(&self.params, &self.snapshot));
        changes
    }

    fn invalidate(&mut self) {
        self.clear_results();
        if self.state == CalcState::Done {
            self.state = CalcState::Stale;
        }
    }

    fn clear_results(&mut self) {
        self.results.clear();
        self.xml = None;
        self.warnings.clear();
    }

    // ─────────────────────────────────────────────────────────
    // 计算
    // ─────────────────────────────────────────────────────────

    /// 解析启动命令
    pub fn make_command(&self) -> Result<String> {
        config::resolve_command(&self.config, |name: &str| (self.env)(name))
    }

    fn pp_root(&self) -> Result<PathBuf> {
        self.pp_path
            .clone()
            .or_else(|| (self.env)("VASP_PP_PATH").map(PathBuf::from))
            .ok_or_else(|| {
                VaspError::Setup(
                    "No pseudopotential path, set VASP_PP_PATH or pass one to the calculator"
                        .to_string(),
                )
            })
    }

    /// 写出全部输入文件（结构按元素排序）
    pub fn write_input(&mut self, structure: &Structure) -> Result<()> {
        let dir = &self.directory;
        fs::create_dir_all(dir).map_err(|e| VaspError::write(dir, e))?;

        let sort = SortIndex::from_structure(structure);
        let sorted = structure.permuted(&sort.sort);
        let pp_root = self.pp_root()?;

        poscar::write_poscar(&dir.join("POSCAR"), &sorted, &structure.formula())?;
        incar::write_incar(&dir.join("INCAR"), &self.params, &sorted)?;
        kpoints::write_kpoints(&dir.join("KPOINTS"), &self.params)?;
        potcar::write_potcar(&dir.join("POTCAR"), &pp_root, &self.params, &sorted)?;
        sort.write(&dir.join(SORT_FILE))?;
        debug!("Wrote VASP input files to {}", dir.display());

        self.sort = Some(sort);
        self.state = CalcState::InputsWritten;
        Ok(())
    }

    /// 计算 `structure`，成功后返回结果
    pub fn calculate(&mut self, structure: &Structure) -> Result<&CalcResults> {
        self.invalidate();
        structure.check()?;
        self.structure = Some(structure.clone());

        if let Err(e) = self.run(structure) {
            self.state = CalcState::Failed;
            self.clear_results();
            return Err(e);
        }

        self.state = CalcState::Done;
        info!(
            "VASP finished in {} (energy = {:?} eV)",
            self.directory.display(),
            self.results.energy
        );
        Ok(&self.results)
    }

    /// 写输入、运行并读取结果，出错时由 `calculate` 标记失败
    fn run(&mut self, structure: &Structure) -> Result<()> {
        let command = self.make_command()?;
        self.write_input(structure)?;

        info!(
            "Running '{}' for {} in {}",
            command,
            structure.formula(),
            self.directory.display()
        );
        self.state = CalcState::Running;
        let code = self
            .launcher
            .launch(&command, &self.directory, &mut self.txt)?;
        if code != 0 {
            return Err(VaspError::CalculationFailed {
                program: PROGRAM.to_string(),
                directory: self.directory.display().to_string(),
                code,
            });
        }

        self.update_structure()?;
        self.read_results()
    }

    /// 离子弛豫后用 CONTCAR 中的坐标与晶胞更新结构
    fn update_structure(&mut self) -> Result<()> {
        if !self.params.moves_ions() {
            return Ok(());
        }
        let (Some(sort), Some(structure)) = (self.sort.as_ref(), self.structure.as_mut()) else {
            return Ok(());
        };

        let species: Vec<String> = poscar::species_runs(&structure.permuted(&sort.sort))
            .into_iter()
            .map(|(el, _)| el)
            .collect();
        let path = self.directory.join("CONTCAR");
        let contcar = poscar::parse_poscar_file(&path, Some(&species))?;
        let positions = reorder(sort, &contcar.positions(), "CONTCAR positions")?;

        for (atom, position) in structure.atoms.iter_mut().zip(positions) {
            atom.position = position;
        }
        structure.lattice = contcar.lattice;
        debug!("Updated structure from {}", path.display());
        Ok(())
    }

    /// 读取 vasprun.xml 与 OUTCAR
    pub fn read_results(&mut self) -> Result<()> {
        let outcar_path = self.directory.join("OUTCAR");
        if !outcar_path.is_file() {
            return Err(VaspError::ReadError {
                path: outcar_path.display().to_string(),
                reason: "File not found, the calculation may not have finished".to_string(),
            });
        }
        let xml = vasprun::read_vasprun(&self.directory.join("vasprun.xml"))?;
        let content = outcar::load_outcar(&outcar_path)?;
        let lines: Vec<&str> = content.lines().collect();

        let sort = self
            .sort
            .clone()
            .ok_or_else(|| VaspError::NotLoaded("Sort index".to_string()))?;

        // vasprun.xml 优先，缺失的量从 OUTCAR 补齐
        let (outcar_free, outcar_zero) = outcar::read_energy(&lines);
        let mut results = CalcResults {
            energy: xml.energy.or(outcar_zero),
            free_energy: xml.free_energy.or(outcar_free),
            stress: xml.stress.or_else(|| outcar::read_stress(&lines)),
            fermi: xml.efermi.or_else(|| outcar::read_fermi(&lines)),
            ..Default::default()
        };
        let forces = match &xml.forces {
            Some(forces) => Some(forces.clone()),
            None => outcar::read_forces(&lines, sort.len()),
        };
        if let Some(forces) = forces {
            results.forces = Some(reorder(&sort, &forces, "forces")?);
        }
        results.converged =
            outcar::read_convergence(&lines, self.params.ibrion(), self.params.nsw());
        let (magmom, magmoms) = self.read_mag(&lines, &xml, &sort)?;
        results.magmom = Some(magmom);
        results.magmoms = Some(magmoms);
        results.dipole = Some(outcar::read_dipole(&lines));
        results.nbands = outcar::read_nbands(&lines).or_else(|| xml.number_of_bands());

        self.version = outcar::read_version(&lines).or_else(|| xml.version.clone());
        self.results.update(results);
        self.xml = Some(xml);
        self.snapshot = self.params.clone();
        Ok(())
    }

    /// (总磁矩, 原子磁矩)
    fn read_mag(
        &mut self,
        lines: &[&str],
        xml: &VasprunData,
        sort: &SortIndex,
    ) -> Result<(f64, Vec<f64>)> {
        let zeros = vec![0.0; sort.len()];
        if !xml.spin_polarized() {
            return Ok((0.0, zeros));
        }

        let magmom = outcar::read_magnetic_moment(lines).unwrap_or(0.0);
        let per_atom = match self.params.lorbit() {
            Some(lorbit) => lorbit >= 10,
            None => self.params.rwigs().is_some_and(|r| !r.is_empty()),
        };
        if !per_atom {
            self.push_warning(ReadWarning::MagmomsNotWritten);
            return Ok((magmom, zeros));
        }

        match outcar::read_magnetic_moments(lines, sort.len()) {
            Some(moments) => Ok((magmom, reorder(sort, &moments, "OUTCAR magnetization")?)),
            None => {
                self.push_warning(ReadWarning::MagnetizationMissing);
                Ok((magmom, zeros))
            }
        }
    }

    fn push_warning(&mut self, warning: ReadWarning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    // ─────────────────────────────────────────────────────────
    // 重启
    // ─────────────────────────────────────────────────────────

    /// 从已完成的计算目录恢复结构、参数与结果
    pub fn read(&mut self) -> Result<()> {
        let dir = self.directory.clone();
        for name in ["OUTCAR", "CONTCAR", "vasprun.xml"] {
            let path = dir.join(name);
            if !path.is_file() {
                return Err(VaspError::ReadError {
                    path: path.display().to_string(),
                    reason: "VASP output file was not found".to_string(),
                });
            }
        }

        let potcar_path = dir.join("POTCAR");
        let (species, pp) = if potcar_path.is_file() {
            potcar::read_potcar(&potcar_path)?
        } else {
            (Vec::new(), None)
        };
        let hint = (!species.is_empty()).then_some(species.as_slice());
        let contcar = poscar::parse_poscar_file(&dir.join("CONTCAR"), hint)?;

        let sort_path = dir.join(SORT_FILE);
        let sort = if sort_path.is_file() {
            SortIndex::read(&sort_path)?
        } else {
            debug!("No {} found, rebuilding it from CONTCAR", SORT_FILE);
            SortIndex::from_structure(&contcar)
        };
        if !sort.covers(contcar.len()) {
            return Err(VaspError::parse(
                "sort",
                sort_path.display().to_string(),
                format!("Sort index does not match the {} atoms in CONTCAR", contcar.len()),
            ));
        }

        let incar_path = dir.join("INCAR");
        let mut params = if incar_path.is_file() {
            incar::read_incar(&incar_path)?
        } else {
            VaspParams::new()
        };
        let kpoints_path = dir.join("KPOINTS");
        if kpoints_path.is_file() {
            match kpoints::read_kpoints(&kpoints_path) {
                Ok(mesh) => {
                    params.set_kpts(mesh.size)?;
                    params.set("gamma", mesh.gamma)?;
                }
                Err(e) => debug!("Skipping KPOINTS: {}", e),
            }
        }
        if let Some(pp) = pp {
            params.set("pp", pp)?;
        }

        self.structure = Some(contcar.permuted(&sort.resort));
        self.sort = Some(sort);
        self.params = params;
        self.clear_results();
        self.read_results()?;
        self.state = CalcState::Done;
        info!("Restarted from {}", dir.display());
        Ok(())
    }

    // ─────────────────────────────────────────────────────────
    // JSON 导入导出
    // ─────────────────────────────────────────────────────────

    pub fn to_state(&self) -> CalculatorState {
        CalculatorState {
            vaspcalc_version: env!("CARGO_PKG_VERSION").to_string(),
            vasp_version: self.version.clone(),
            inputs: self.params.flatten(),
            results: self.results.clone(),
            atoms: self.structure.clone(),
        }
    }

    /// 写入工作目录下的 `filename`
    pub fn write_json(&self, filename: impl AsRef<Path>) -> Result<()> {
        let path = self.directory.join(filename);
        self.to_state().write(&path)?;
        debug!("Wrote calculator state to {}", path.display());
        Ok(())
    }

    pub fn read_json(&mut self, path: &Path) -> Result<()> {
        let state = CalculatorState::read(path)?;
        self.import_state(state)
    }

    /// 导入状态，参数重新经过注册表并作为快照保存
    pub fn import_state(&mut self, state: CalculatorState) -> Result<()> {
        if state.vasp_version.is_some() {
            self.version = state.vasp_version;
        }
        self.params.update(state.inputs)?;
        self.snapshot = self.params.clone();
        if let Some(atoms) = state.atoms {
            self.set_structure(&atoms);
        }
        self.results.update(state.results);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────
    // vasprun.xml 中的电子结构
    // ─────────────────────────────────────────────────────────

    fn xml(&self) -> Result<&VasprunData> {
        self.xml
            .as_ref()
            .ok_or_else(|| VaspError::NotLoaded("vasprun.xml".to_string()))
    }

    pub fn ibz_k_points(&self) -> Result<&[[f64; 3]]> {
        Ok(&self.xml()?.kpoints)
    }

    pub fn eigenvalues(&self, kpt: usize, spin: usize) -> Result<&[f64]> {
        self.xml()?
            .eigenvalues(kpt, spin)
            .ok_or_else(|| no_band_data(kpt, spin))
    }

    pub fn occupation_numbers(&self, kpt: usize, spin: usize) -> Result<&[f64]> {
        self.xml()?
            .occupation_numbers(kpt, spin)
            .ok_or_else(|| no_band_data(kpt, spin))
    }

    pub fn fermi_level(&self) -> Result<Option<f64>> {
        Ok(self.xml()?.efermi)
    }

    pub fn homo_lumo(&self) -> Result<Option<(f64, f64)>> {
        Ok(self.xml()?.homo_lumo())
    }

    pub fn homo_lumo_by_spin(&self, spin: usize) -> Result<Option<(f64, f64)>> {
        Ok(self.xml()?.homo_lumo_by_spin(spin))
    }

    /// 高斯展宽的总态密度 (能量, DOS)，能量以费米能级为零点
    ///
    /// `spin` 为 `None` 时对自旋求和。
    pub fn dos(&self, spin: Option<usize>) -> Result<(Vec<f64>, Vec<f64>)> {
        self.xml()?
            .total_dos(spin, vasprun::DOS_WIDTH, vasprun::DOS_POINTS)
            .ok_or_else(|| no_band_data(0, spin.unwrap_or(0)))
    }

    pub fn number_of_spins(&self) -> Result<usize> {
        Ok(self.xml()?.number_of_spins())
    }

    pub fn spin_polarized(&self) -> Result<bool> {
        Ok(self.xml()?.spin_polarized())
    }

    // ─────────────────────────────────────────────────────────
    // 工作目录中的其他输出
    // ─────────────────────────────────────────────────────────

    fn with_outcar<T>(&self, f: impl FnOnce(&[&str]) -> T) -> Result<T> {
        let content = outcar::load_outcar(&self.directory.join("OUTCAR"))?;
        let lines: Vec<&str> = content.lines().collect();
        Ok(f(&lines))
    }

    /// IBZKPT 中的 k 点权重
    pub fn k_point_weights(&self) -> Result<Vec<f64>> {
        kpoints::read_kpoint_weights(&self.directory.join("IBZKPT"))
    }

    pub fn number_of_iterations(&self) -> Result<Option<usize>> {
        self.with_outcar(outcar::read_number_of_iterations)
    }

    pub fn number_of_ionic_steps(&self) -> Result<Option<usize>> {
        self.with_outcar(outcar::read_number_of_ionic_steps)
    }

    pub fn number_of_electrons(&self) -> Result<Option<f64>> {
        self.with_outcar(outcar::read_number_of_electrons)
    }

    /// 所有离子步的 (自由能, energy(sigma->0))
    pub fn energy_trajectory(&self) -> Result<(Vec<f64>, Vec<f64>)> {
        self.with_outcar(|lines| {
            (
                outcar::read_free_energies(lines),
                outcar::read_zero_energies(lines),
            )
        })
    }

    /// 所有离子步的受力，调用方顺序
    pub fn force_trajectory(&self) -> Result<Vec<Vec<[f64; 3]>>> {
        let sort = self
            .sort
            .as_ref()
            .ok_or_else(|| VaspError::NotLoaded("Sort index".to_string()))?;
        self.with_outcar(|lines| outcar::read_all_forces(lines, sort.len()))?
            .iter()
            .map(|forces| reorder(sort, forces, "OUTCAR forces"))
            .collect()
    }

    pub fn ldau(&self) -> Result<Option<LdauInfo>> {
        self.with_outcar(outcar::read_ldau)
    }

    /// 振动频率 (实频, 虚频)，单位 meV
    pub fn vib_frequencies(&self) -> Result<(Vec<f64>, Vec<f64>)> {
        self.with_outcar(outcar::read_vib_freq)
    }

    /// BEEF-vdW 的 32 个非自洽能量贡献
    pub fn beef_energies(&self) -> Result<Vec<f64>> {
        self.with_outcar(outcar::read_beef_contributions)?
            .ok_or_else(|| VaspError::ReadError {
                path: self.directory.join("OUTCAR").display().to_string(),
                reason: format!(
                    "Expected {} BEEF xc energy contributions",
                    outcar::BEEF_CONTRIBUTIONS
                ),
            })
    }

    /// OUTCAR 是否有正常结束的标记
    pub fn finished(&self) -> Result<bool> {
        self.with_outcar(outcar::read_finished)
    }
}

fn no_band_data(kpt: usize, spin: usize) -> VaspError {
    VaspError::ReadError {
        path: "vasprun.xml".to_string(),
        reason: format!("No band data for k-point {} and spin {}", kpt, spin),
    }
}

/// VASP 顺序 → 调用方顺序，长度不符时报错
fn reorder<T: Clone>(sort: &SortIndex, values: &[T], what: &str) -> Result<Vec<T>> {
    if !sort.covers(values.len()) {
        return Err(VaspError::ReadError {
            path: SORT_FILE.to_string(),
            reason: format!(
                "{} has {} entries but the sort index covers {} atoms",
                what,
                values.len(),
                sort.len()
            ),
        });
    }
    Ok(sort.to_caller(values))
}
