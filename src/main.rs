fn main() {
    mdet_lib::run()
}
